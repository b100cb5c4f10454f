use anyhow::Context;

use crate::record::MetadataRecord;
use crate::xml;

/// Remove the OAI envelope wrapper from each record, leaving only the
/// payload inside `metadata`.
pub struct StripAction;

impl StripAction {
    pub fn new() -> Self {
        Self
    }

    pub fn perform(&mut self, batch: &mut Vec<MetadataRecord>) -> anyhow::Result<()> {
        for record in batch.iter_mut() {
            if record.is_list || record.is_envelope {
                anyhow::bail!("strip requires a single record, not an envelope");
            }
            record.document = xml::strip_envelope(&record.document)
                .with_context(|| format!("failed to strip record {}", record.id))?;
        }
        Ok(())
    }
}
