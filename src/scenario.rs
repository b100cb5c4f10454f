//! Drives one provider through the OAI protocol for one action sequence.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::action::{self, ActionSequence};
use crate::cycle::ScenarioKind;
use crate::harvest::{
    self, FormatHarvesting, IdentifierListHarvesting, PrefixHarvesting, RecordHarvesting,
    RecordListHarvesting, StaticPrefixHarvesting, StaticRecordListHarvesting,
};
use crate::oai::OaiClient;
use crate::provider::{Provider, StaticArchive};

/// Where a scenario's records come from: a live endpoint or a parsed
/// static archive. The pipeline never sees the difference.
pub enum Source {
    Live { client: Arc<OaiClient> },
    Static { archive: Arc<StaticArchive> },
}

pub struct Scenario {
    provider: Arc<Provider>,
    source: Source,
}

impl Scenario {
    pub fn new(provider: Arc<Provider>, source: Source) -> Self {
        Self { provider, source }
    }

    /// Run the scenario to exhaustion for one action sequence.
    ///
    /// Returns true iff at least one record reached the final Save
    /// without error. A transient failure inside one prefix's pagination
    /// stops that prefix only.
    pub async fn run(
        &self,
        kind: ScenarioKind,
        sequence: &ActionSequence,
        from: Option<DateTime<Utc>>,
        shutdown: &AtomicBool,
    ) -> bool {
        let prefixes = self.matching_prefixes(sequence).await;
        if prefixes.is_empty() {
            info!(
                "no matching prefixes on {} for sequence {}",
                self.provider.name, sequence.input_format.prefix
            );
            return false;
        }

        let mut actions = sequence.instantiate(self.provider.timeout);
        let mut saved = 0usize;

        for prefix in prefixes {
            let mut strategy = self.record_strategy(kind, &prefix, from);
            loop {
                if shutdown.load(Ordering::Relaxed) {
                    info!("shutdown requested, stopping harvest of {}", self.provider.name);
                    return saved > 0;
                }
                if !harvest::advance(strategy.as_mut()).await {
                    break;
                }
                for record in strategy.take_records() {
                    match action::run_pipeline(&mut actions, vec![record]).await {
                        Ok(count) => saved += count,
                        Err(error) => {
                            error!(
                                "pipeline failed for {} ({}): {error:#}",
                                self.provider.name, prefix
                            );
                        }
                    }
                }
            }
        }

        saved > 0
    }

    /// Advertised prefixes, filtered by the provider allow-list and
    /// intersected with the sequence's declared input prefix. An empty
    /// result means this sequence is not applicable and nothing beyond
    /// the format listing has been requested.
    async fn matching_prefixes(&self, sequence: &ActionSequence) -> Vec<String> {
        let advertised = match &self.source {
            Source::Live { client } => {
                collect_prefixes(&mut FormatHarvesting::new(client.clone())).await
            }
            Source::Static { archive } => {
                collect_prefixes(&mut StaticPrefixHarvesting::new(archive.clone())).await
            }
        };
        advertised
            .into_iter()
            .filter(|prefix| self.provider.allows_prefix(prefix))
            .filter(|prefix| *prefix == sequence.input_format.prefix)
            .collect()
    }

    fn record_strategy(
        &self,
        kind: ScenarioKind,
        prefix: &str,
        from: Option<DateTime<Utc>>,
    ) -> Box<dyn RecordHarvesting> {
        match &self.source {
            Source::Static { archive } => Box::new(StaticRecordListHarvesting::new(
                archive.clone(),
                prefix.to_string(),
                self.provider.name.clone(),
            )),
            Source::Live { client } => match kind {
                ScenarioKind::ListIdentifiers => Box::new(IdentifierListHarvesting::new(
                    client.clone(),
                    prefix.to_string(),
                    self.provider.name.clone(),
                    from,
                )),
                ScenarioKind::ListRecords => Box::new(RecordListHarvesting::new(
                    client.clone(),
                    prefix.to_string(),
                    self.provider.name.clone(),
                    from,
                )),
            },
        }
    }
}

async fn collect_prefixes<H: PrefixHarvesting>(strategy: &mut H) -> Vec<String> {
    if !strategy.request().await {
        return Vec::new();
    }
    if !strategy.process_response() {
        return Vec::new();
    }
    strategy.take_prefixes()
}
