pub mod action;
pub mod config;
pub mod controller;
pub mod cycle;
pub mod harvest;
pub mod oai;
pub mod provider;
pub mod record;
pub mod scenario;
pub mod worker;
mod xml;

use std::path::{Path, PathBuf};

pub use action::{ActionSequence, ActionSpec, InputFormat};
pub use config::{ConfigError, HarvestConfig};
pub use controller::{RunSummary, run_cycle, run_endpoint};
pub use cycle::{
    Cycle, CycleMode, CycleProperties, Endpoint, Overview, OverviewError, ScenarioKind,
};
pub use provider::{Provider, ProviderKind, StaticArchive};
pub use record::MetadataRecord;
pub use worker::Worker;

pub fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}
