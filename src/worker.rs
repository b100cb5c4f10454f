//! One worker per (endpoint, cycle iteration): resolves the provider,
//! picks the cycle's scenario, and tries the configured action sequences
//! until one succeeds.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::HarvestConfig;
use crate::cycle::{Cycle, Endpoint, OverviewError, ScenarioKind};
use crate::oai::{OaiClient, response};
use crate::provider::{ProviderKind, StaticArchive};
use crate::scenario::{Scenario, Source};

pub struct Worker {
    cycle: Arc<Cycle>,
    config: Arc<HarvestConfig>,
    shutdown: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(
        cycle: Arc<Cycle>,
        config: Arc<HarvestConfig>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            cycle,
            config,
            shutdown,
        }
    }

    /// Harvest one endpoint and record the outcome. The attempt is
    /// recorded even when the harvest itself errored; only a failing
    /// overview flush propagates.
    pub async fn run(&self, endpoint: Endpoint) -> Result<bool, OverviewError> {
        info!("harvest attempt starting for {}", endpoint.uri);
        let success = match self.harvest(&endpoint).await {
            Ok(success) => success,
            Err(error) => {
                error!("harvest of {} failed: {error:#}", endpoint.uri);
                false
            }
        };
        self.cycle.record_attempt(&endpoint.uri, success).await?;
        if success {
            info!("harvest of {} succeeded", endpoint.uri);
        } else {
            warn!("harvest of {} did not succeed", endpoint.uri);
        }
        Ok(success)
    }

    async fn harvest(&self, endpoint: &Endpoint) -> anyhow::Result<bool> {
        let provider = Arc::new(self.config.resolve_provider(&endpoint.uri));

        let request_date = self.cycle.request_date(endpoint);
        let from = (request_date != DateTime::<Utc>::UNIX_EPOCH).then_some(request_date);
        debug!(
            "harvesting {} from {:?}",
            endpoint.uri,
            from.map(crate::oai::format_datestamp)
        );

        let source = match &provider.kind {
            ProviderKind::Live => {
                let client = Arc::new(OaiClient::new(&provider.base_url, provider.timeout)?);
                let body = client
                    .identify()
                    .await
                    .with_context(|| format!("Identify failed for {}", provider.base_url))?;
                response::parse(&body)
                    .with_context(|| format!("bad Identify response from {}", provider.base_url))?;
                Source::Live { client }
            }
            ProviderKind::Static { archive } => Source::Static {
                archive: Arc::new(StaticArchive::load(archive)?),
            },
        };

        let kind = self.cycle.properties().scenario;
        // static sources and ListRecords both hand the pipeline raw
        // envelopes, which only a Split-led sequence can consume
        let needs_split = matches!(kind, ScenarioKind::ListRecords) || provider.is_static();

        let scenario = Scenario::new(provider.clone(), source);
        for sequence in &self.config.sequences {
            if needs_split && !sequence.starts_with_split() {
                debug!(
                    "sequence for {} does not open with split, skipping",
                    sequence.input_format.prefix
                );
                continue;
            }
            if scenario.run(kind, sequence, from, &self.shutdown).await {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
