use std::path::PathBuf;

use anyhow::Context;
use tracing::info;

use crate::record::MetadataRecord;

/// Persist each record under `<outputRoot>/<provider>/<prefix>/<id>.xml`.
/// Writes go to a temp path first and are renamed into place, so a
/// crashed worker never leaves a half-written record behind.
pub struct SaveAction {
    output_root: PathBuf,
}

impl SaveAction {
    pub fn new(output_root: PathBuf) -> Self {
        Self { output_root }
    }

    pub async fn perform(&mut self, batch: &mut Vec<MetadataRecord>) -> anyhow::Result<()> {
        for record in batch.iter() {
            if !record.is_finalised() {
                anyhow::bail!(
                    "refusing to save unfinalised record (id {:?}, envelope {}, list {})",
                    record.id,
                    record.is_envelope,
                    record.is_list
                );
            }

            let path = self.output_root.join(record.path());
            let parent = path
                .parent()
                .ok_or_else(|| anyhow::anyhow!("record path has no parent directory"))?;
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;

            let tmp = path.with_extension("xml.tmp");
            tokio::fs::write(&tmp, record.document.as_bytes())
                .await
                .with_context(|| format!("failed to write {}", tmp.display()))?;
            tokio::fs::rename(&tmp, &path)
                .await
                .with_context(|| format!("failed to move record into {}", path.display()))?;

            info!("saved {}", path.display());
        }
        Ok(())
    }
}
