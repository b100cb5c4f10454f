//! The persistent endpoint overview: one record per endpoint the
//! harvester has ever been configured with, tracking attempt/success
//! history across cycles.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-endpoint cycle state.
///
/// Invariants at rest:
/// - `harvested <= attempted`
/// - `attempted == harvested` iff the last attempt succeeded
///
/// Records are created when an endpoint first appears in the
/// configuration and are never deleted here; `attempted` is set on every
/// attempt, `harvested` only on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(rename = "@uri")]
    pub uri: String,
    #[serde(rename = "@group", default)]
    pub group: String,
    #[serde(rename = "@blocked", default)]
    pub blocked: bool,
    #[serde(rename = "@retry", default)]
    pub retry: bool,
    #[serde(rename = "@incremental", default = "default_incremental")]
    pub allow_incremental_harvest: bool,
    #[serde(
        rename = "@attempted",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub attempted: Option<DateTime<Utc>>,
    #[serde(
        rename = "@harvested",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub harvested: Option<DateTime<Utc>>,
}

fn default_incremental() -> bool {
    true
}

impl Endpoint {
    pub fn new(uri: String, group: String) -> Self {
        Self {
            uri,
            group,
            blocked: false,
            retry: false,
            allow_incremental_harvest: true,
            attempted: None,
            harvested: None,
        }
    }

    pub fn last_attempt_succeeded(&self) -> bool {
        self.attempted.is_some() && self.attempted == self.harvested
    }

    pub fn attempted_today(&self, today: chrono::NaiveDate) -> bool {
        self.attempted
            .map(|at| at.date_naive() == today)
            .unwrap_or(false)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OverviewError {
    #[error("failed to read overview {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed overview {path}: {source}")]
    Parse {
        path: PathBuf,
        source: quick_xml::DeError,
    },
    #[error("failed to serialise overview: {0}")]
    Serialize(#[from] quick_xml::SeError),
    #[error("failed to write overview {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    #[serde(default, rename = "endpoint")]
    pub endpoints: Vec<Endpoint>,
}

impl Overview {
    /// A missing file is an empty overview (first run).
    pub fn load(path: &Path) -> Result<Self, OverviewError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(OverviewError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        quick_xml::de::from_str(&content).map_err(|source| OverviewError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Look up an endpoint by URI, creating it when absent.
    pub fn ensure(&mut self, uri: &str, group: &str) -> &mut Endpoint {
        if let Some(index) = self.endpoints.iter().position(|e| e.uri == uri) {
            return &mut self.endpoints[index];
        }
        self.endpoints
            .push(Endpoint::new(uri.to_string(), group.to_string()));
        self.endpoints.last_mut().expect("endpoint just pushed")
    }

    pub fn to_xml(&self) -> Result<String, OverviewError> {
        let mut body = String::new();
        let mut serializer = quick_xml::se::Serializer::with_root(&mut body, Some("overview"))?;
        serializer.indent(' ', 2);
        self.serialize(serializer)?;
        Ok(format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}\n",
            body
        ))
    }

    /// Temp-file + rename so readers never observe a partial overview.
    pub async fn store(&self, path: &Path) -> Result<(), OverviewError> {
        let xml = self.to_xml()?;
        let tmp = path.with_extension("xml.tmp");
        let write = async {
            tokio::fs::write(&tmp, xml.as_bytes()).await?;
            tokio::fs::rename(&tmp, path).await
        };
        write.await.map_err(|source| OverviewError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
