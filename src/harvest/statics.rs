//! Strategies over a static-repository archive. Same interface as the
//! live variants, no network I/O and no pagination.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use crate::harvest::{
    Harvesting, PrefixHarvesting, RecordHarvesting, StrategyState,
};
use crate::provider::StaticArchive;
use crate::record::MetadataRecord;

pub struct StaticPrefixHarvesting {
    archive: Arc<StaticArchive>,
    prefixes: Vec<String>,
    state: StrategyState,
}

impl StaticPrefixHarvesting {
    pub fn new(archive: Arc<StaticArchive>) -> Self {
        Self {
            archive,
            prefixes: Vec::new(),
            state: StrategyState::Ready,
        }
    }
}

impl Harvesting for StaticPrefixHarvesting {
    fn request(&mut self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            if self.state.is_terminal() {
                return false;
            }
            self.state = StrategyState::Requesting;
            true
        })
    }

    fn process_response(&mut self) -> bool {
        self.state = StrategyState::Parsing;
        self.prefixes = self
            .archive
            .formats()
            .iter()
            .map(|f| f.prefix.clone())
            .collect();
        self.state = StrategyState::Done;
        true
    }

    fn fully_parsed(&self) -> bool {
        self.state.is_terminal()
    }

    fn resumption_token(&self) -> Option<&str> {
        None
    }

    fn state(&self) -> StrategyState {
        self.state
    }
}

impl PrefixHarvesting for StaticPrefixHarvesting {
    fn take_prefixes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.prefixes)
    }
}

pub struct StaticRecordListHarvesting {
    archive: Arc<StaticArchive>,
    prefix: String,
    origin: String,
    records: Vec<MetadataRecord>,
    state: StrategyState,
}

impl StaticRecordListHarvesting {
    pub fn new(archive: Arc<StaticArchive>, prefix: String, origin: String) -> Self {
        Self {
            archive,
            prefix,
            origin,
            records: Vec::new(),
            state: StrategyState::Ready,
        }
    }
}

impl Harvesting for StaticRecordListHarvesting {
    fn request(&mut self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            if self.state.is_terminal() {
                return false;
            }
            self.state = StrategyState::Requesting;
            true
        })
    }

    fn process_response(&mut self) -> bool {
        self.state = StrategyState::Parsing;
        match self.archive.records_envelope(&self.prefix) {
            Some(envelope) => {
                info!("static records for {} ({})", self.origin, self.prefix);
                self.records.push(MetadataRecord::envelope(
                    self.prefix.clone(),
                    envelope.to_string(),
                    self.origin.clone(),
                ));
            }
            None => {
                warn!(
                    "archive for {} has no ListRecords section for {}",
                    self.origin, self.prefix
                );
            }
        }
        self.state = StrategyState::Done;
        true
    }

    fn fully_parsed(&self) -> bool {
        self.state.is_terminal()
    }

    fn resumption_token(&self) -> Option<&str> {
        None
    }

    fn state(&self) -> StrategyState {
        self.state
    }
}

impl RecordHarvesting for StaticRecordListHarvesting {
    fn take_records(&mut self) -> Vec<MetadataRecord> {
        std::mem::take(&mut self.records)
    }
}
