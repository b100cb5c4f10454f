//! The harvester configuration file: providers, action sequences and
//! cycle properties, declared in XML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::action::{ActionSequence, ActionSpec, InputFormat};
use crate::cycle::{CycleMode, CycleProperties, ScenarioKind};
use crate::expand_path;
use crate::provider::{Provider, ProviderKind, normalize_base_url};

const DEFAULT_CONCURRENCY: usize = 2;
const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: quick_xml::DeError,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Validated configuration, ready for the controller.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub properties: CycleProperties,
    pub sequences: Vec<ActionSequence>,
    pub providers: Vec<Provider>,
}

impl HarvestConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawConfig =
            quick_xml::de::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let base_dir = path.parent().unwrap_or(Path::new("."));
        Self::from_raw(raw, base_dir)
    }

    fn from_raw(raw: RawConfig, base_dir: &Path) -> Result<Self, ConfigError> {
        let properties = CycleProperties {
            mode: raw.cycle.mode.unwrap_or(CycleMode::Normal),
            scenario: raw.cycle.scenario.unwrap_or(ScenarioKind::ListRecords),
            concurrency: raw.cycle.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
            from_override: raw.cycle.from,
        };
        if properties.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "cycle concurrency must be at least 1".to_string(),
            ));
        }

        let mut sequences = Vec::new();
        for raw_sequence in raw.actions.sequences {
            let sequence = ActionSequence {
                input_format: InputFormat {
                    prefix: raw_sequence.prefix,
                    schema: raw_sequence.schema,
                    namespace: raw_sequence.namespace,
                },
                actions: raw_sequence
                    .actions
                    .into_iter()
                    .map(|action| action.into_spec(base_dir))
                    .collect(),
            };
            sequence.validate().map_err(ConfigError::Invalid)?;
            sequences.push(sequence);
        }
        if sequences.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one action sequence is required".to_string(),
            ));
        }

        let mut providers: Vec<Provider> = Vec::new();
        for raw_provider in raw.providers.providers {
            let provider = raw_provider.into_provider(base_dir)?;
            if providers.iter().any(|p| p.base_url == provider.base_url) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate provider URL {}",
                    provider.base_url
                )));
            }
            providers.push(provider);
        }

        Ok(Self {
            properties,
            sequences,
            providers,
        })
    }

    pub fn provider_for(&self, uri: &str) -> Option<&Provider> {
        let uri = normalize_base_url(uri);
        self.providers.iter().find(|p| p.base_url == uri)
    }

    /// Resolve an endpoint URI to its configured provider, or build an
    /// ad-hoc live provider for targeted runs against unconfigured
    /// endpoints.
    pub fn resolve_provider(&self, uri: &str) -> Provider {
        match self.provider_for(uri) {
            Some(provider) => provider.clone(),
            None => {
                let base_url = normalize_base_url(uri);
                Provider {
                    name: host_name(&base_url),
                    base_url,
                    group: String::new(),
                    prefixes: None,
                    timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
                    kind: ProviderKind::Live,
                }
            }
        }
    }
}

fn host_name(base_url: &str) -> String {
    let after_scheme = base_url
        .find("://")
        .map(|i| &base_url[i + 3..])
        .unwrap_or(base_url);
    after_scheme
        .split('/')
        .next()
        .unwrap_or(after_scheme)
        .to_string()
}

fn resolve_path(base_dir: &Path, raw: &Path) -> PathBuf {
    let expanded = expand_path(raw);
    if expanded.is_absolute() {
        expanded
    } else {
        base_dir.join(expanded)
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    cycle: RawCycle,
    #[serde(default)]
    actions: RawActions,
    #[serde(default)]
    providers: RawProviders,
}

#[derive(Debug, Default, Deserialize)]
struct RawCycle {
    #[serde(rename = "@mode", default)]
    mode: Option<CycleMode>,
    #[serde(rename = "@scenario", default)]
    scenario: Option<ScenarioKind>,
    #[serde(rename = "@concurrency", default)]
    concurrency: Option<usize>,
    #[serde(rename = "@from", default)]
    from: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawActions {
    #[serde(default, rename = "sequence")]
    sequences: Vec<RawSequence>,
}

#[derive(Debug, Deserialize)]
struct RawSequence {
    #[serde(rename = "@prefix")]
    prefix: String,
    #[serde(rename = "@schema", default)]
    schema: Option<String>,
    #[serde(rename = "@namespace", default)]
    namespace: Option<String>,
    #[serde(rename = "$value")]
    actions: Vec<RawAction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawAction {
    Split,
    Strip,
    Transform {
        #[serde(rename = "@file")]
        file: PathBuf,
    },
    Save {
        #[serde(rename = "@dir")]
        dir: PathBuf,
    },
}

impl RawAction {
    fn into_spec(self, base_dir: &Path) -> ActionSpec {
        match self {
            RawAction::Split => ActionSpec::Split,
            RawAction::Strip => ActionSpec::Strip,
            RawAction::Transform { file } => ActionSpec::Transform {
                stylesheet: resolve_path(base_dir, &file),
            },
            RawAction::Save { dir } => ActionSpec::Save {
                output_root: resolve_path(base_dir, &dir),
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawProviders {
    #[serde(default, rename = "provider")]
    providers: Vec<RawProvider>,
}

#[derive(Debug, Deserialize)]
struct RawProvider {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@url")]
    url: String,
    #[serde(rename = "@group", default)]
    group: String,
    #[serde(rename = "@timeout", default)]
    timeout: Option<u64>,
    #[serde(rename = "@static", default)]
    is_static: bool,
    #[serde(default, rename = "prefix")]
    prefixes: Vec<String>,
}

impl RawProvider {
    fn into_provider(self, base_dir: &Path) -> Result<Provider, ConfigError> {
        let timeout = Duration::from_secs(self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECONDS));
        let prefixes = if self.prefixes.is_empty() {
            None
        } else {
            Some(self.prefixes)
        };

        if self.is_static {
            let raw_path = self.url.strip_prefix("file://").unwrap_or(&self.url);
            let archive = resolve_path(base_dir, Path::new(raw_path));
            return Ok(Provider {
                name: self.name,
                base_url: format!("file://{}", archive.display()),
                group: self.group,
                prefixes,
                timeout,
                kind: ProviderKind::Static { archive },
            });
        }

        if !self.url.contains("://") {
            return Err(ConfigError::Invalid(format!(
                "provider {} has no scheme in its URL: {}",
                self.name, self.url
            )));
        }
        Ok(Provider {
            name: self.name,
            base_url: normalize_base_url(&self.url),
            group: self.group,
            prefixes,
            timeout,
            kind: ProviderKind::Live,
        })
    }
}
