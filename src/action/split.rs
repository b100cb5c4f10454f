use anyhow::Context;
use tracing::warn;

use crate::record::MetadataRecord;
use crate::xml;

/// Break list envelopes into one self-contained document per `record`
/// element, matching on local name so the source namespace does not
/// matter. Each emitted document is an independent deep copy.
pub struct SplitAction;

impl SplitAction {
    pub fn new() -> Self {
        Self
    }

    pub fn perform(&mut self, batch: &mut Vec<MetadataRecord>) -> anyhow::Result<()> {
        let mut output = Vec::new();
        for record in batch.drain(..) {
            if !record.is_list {
                anyhow::bail!("split requires a list envelope record");
            }
            let parts = xml::copy_elements(&record.document, "record")
                .with_context(|| format!("failed to split envelope from {}", record.origin))?;
            if parts.is_empty() {
                anyhow::bail!("no content: envelope from {} holds no records", record.origin);
            }
            for part in parts {
                match xml::extract_identifier(&part.document)? {
                    Some(id) => output.push(MetadataRecord::single(
                        id,
                        record.prefix.clone(),
                        part.document,
                        record.origin.clone(),
                    )),
                    None => {
                        warn!(
                            "record without identifier in envelope from {}, skipping",
                            record.origin
                        );
                    }
                }
            }
        }
        *batch = output;
        Ok(())
    }
}
