use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use futures::future::BoxFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;

use crate::record::MetadataRecord;

/// Stylesheet application contract consumed by the Transform action.
pub trait Transformer: Send + Sync {
    fn transform<'a>(&'a self, document: &'a str) -> BoxFuture<'a, anyhow::Result<String>>;
}

/// Apply the configured stylesheet to every record in the batch.
pub struct TransformAction {
    transformer: Box<dyn Transformer>,
}

impl TransformAction {
    pub fn new(transformer: Box<dyn Transformer>) -> Self {
        Self { transformer }
    }

    pub async fn perform(&mut self, batch: &mut Vec<MetadataRecord>) -> anyhow::Result<()> {
        for record in batch.iter_mut() {
            record.document = self
                .transformer
                .transform(&record.document)
                .await
                .with_context(|| format!("transform failed for record {}", record.id))?;
        }
        Ok(())
    }
}

/// Shells out to `xsltproc`, feeding the document on stdin.
pub struct XsltprocTransformer {
    stylesheet: PathBuf,
    timeout: Duration,
}

impl XsltprocTransformer {
    pub fn new(stylesheet: PathBuf, timeout: Duration) -> Self {
        Self {
            stylesheet,
            timeout,
        }
    }
}

impl Transformer for XsltprocTransformer {
    fn transform<'a>(&'a self, document: &'a str) -> BoxFuture<'a, anyhow::Result<String>> {
        Box::pin(async move {
            let mut child = Command::new("xsltproc")
                .arg(&self.stylesheet)
                .arg("-")
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .context("failed to spawn xsltproc")?;

            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow::anyhow!("failed to open xsltproc stdin"))?;
            let mut stdout = child
                .stdout
                .take()
                .ok_or_else(|| anyhow::anyhow!("failed to capture xsltproc stdout"))?;
            let mut stderr = child
                .stderr
                .take()
                .ok_or_else(|| anyhow::anyhow!("failed to capture xsltproc stderr"))?;

            let stdout_task = tokio::spawn(async move {
                let mut buf = Vec::new();
                stdout.read_to_end(&mut buf).await?;
                Ok::<Vec<u8>, std::io::Error>(buf)
            });
            let stderr_task = tokio::spawn(async move {
                let mut buf = Vec::new();
                stderr.read_to_end(&mut buf).await?;
                Ok::<Vec<u8>, std::io::Error>(buf)
            });

            stdin.write_all(document.as_bytes()).await?;
            drop(stdin);

            let status = match timeout(self.timeout, child.wait()).await {
                Ok(Ok(status)) => status,
                Ok(Err(error)) => {
                    let _ = stdout_task.await;
                    let _ = stderr_task.await;
                    return Err(error.into());
                }
                Err(_) => {
                    let _ = child.kill().await;
                    let _ = child.wait().await;
                    let _ = stdout_task.await;
                    let _ = stderr_task.await;
                    anyhow::bail!("xsltproc timed out after {}s", self.timeout.as_secs());
                }
            };

            let stdout = stdout_task
                .await
                .map_err(|err| anyhow::anyhow!("failed to collect xsltproc output: {}", err))??;
            let stderr = stderr_task
                .await
                .map_err(|err| anyhow::anyhow!("failed to collect xsltproc stderr: {}", err))??;

            if status.success() {
                String::from_utf8(stdout).context("xsltproc produced non-utf8 output")
            } else {
                let stderr = clip_excerpt(&String::from_utf8_lossy(&stderr), 200);
                anyhow::bail!("xsltproc failed: {}", stderr)
            }
        })
    }
}

/// Keep the first and last `keep` chars of a stderr dump so error
/// messages stay readable when a stylesheet goes haywire.
fn clip_excerpt(text: &str, keep: usize) -> String {
    let total = text.chars().count();
    if total <= keep * 2 {
        return text.to_string();
    }

    let head: String = text.chars().take(keep).collect();
    let tail: String = text.chars().skip(total - keep).collect();
    format!("{head} [... {} chars clipped ...] {tail}", total - keep * 2)
}
