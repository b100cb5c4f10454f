//! The cycle state machine: the single shared object deciding which
//! endpoints to contact in this run and from what timestamp.

pub mod overview;

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;

pub use overview::{Endpoint, Overview, OverviewError};

use crate::provider::{Provider, normalize_base_url};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleMode {
    /// Harvest every unblocked endpoint incrementally.
    Normal,
    /// Only endpoints whose previous attempt failed after the last
    /// success, and only when flagged for retry.
    Retry,
    /// Full re-harvest of every unblocked endpoint.
    Refresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ScenarioKind {
    ListIdentifiers,
    ListRecords,
}

#[derive(Debug, Clone)]
pub struct CycleProperties {
    pub mode: CycleMode,
    pub scenario: ScenarioKind,
    pub concurrency: usize,
    /// Replaces the computed request date in normal mode.
    pub from_override: Option<DateTime<Utc>>,
}

struct CycleState {
    overview: Overview,
    /// Endpoints handed out by `next`/`next_for` in this process
    /// lifetime; never dispensed twice.
    dispensed: HashSet<String>,
}

/// Authoritative endpoint state across workers and across runs. All
/// access to the overview and the dispensed set goes through one mutex.
pub struct Cycle {
    properties: CycleProperties,
    path: PathBuf,
    inner: Mutex<CycleState>,
}

impl Cycle {
    /// Load the overview and register any configured providers that are
    /// not yet part of it.
    pub fn load(
        path: PathBuf,
        properties: CycleProperties,
        providers: &[Provider],
    ) -> Result<Self, OverviewError> {
        let mut overview = Overview::load(&path)?;
        for provider in providers {
            overview.ensure(&provider.base_url, &provider.group);
        }
        Ok(Self {
            properties,
            path,
            inner: Mutex::new(CycleState {
                overview,
                dispensed: HashSet::new(),
            }),
        })
    }

    pub fn properties(&self) -> &CycleProperties {
        &self.properties
    }

    /// The next endpoint eligible for this cycle: not attempted today,
    /// not already dispensed, first in file order.
    pub async fn next(&self) -> Option<Endpoint> {
        let today = Utc::now().date_naive();
        let mut state = self.inner.lock().await;
        let state = &mut *state;
        let next = state
            .overview
            .endpoints
            .iter()
            .find(|e| !state.dispensed.contains(&e.uri) && !e.attempted_today(today))
            .cloned();
        if let Some(endpoint) = next {
            state.dispensed.insert(endpoint.uri.clone());
            Some(endpoint)
        } else {
            None
        }
    }

    /// Look up or create the endpoint for a targeted single-endpoint run.
    pub async fn next_for(&self, uri: &str, group: &str) -> Endpoint {
        let uri = normalize_base_url(uri);
        let mut state = self.inner.lock().await;
        let endpoint = state.overview.ensure(&uri, group).clone();
        state.dispensed.insert(endpoint.uri.clone());
        endpoint
    }

    /// Should this endpoint be contacted now?
    pub fn do_harvest(&self, endpoint: &Endpoint) -> bool {
        match self.properties.mode {
            CycleMode::Normal | CycleMode::Refresh => !endpoint.blocked,
            CycleMode::Retry => {
                endpoint.retry && endpoint.attempted != endpoint.harvested
            }
        }
    }

    /// The `from` timestamp for selective harvesting of this endpoint.
    pub fn request_date(&self, endpoint: &Endpoint) -> DateTime<Utc> {
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        match self.properties.mode {
            CycleMode::Normal => {
                if endpoint.blocked || !endpoint.allow_incremental_harvest {
                    return epoch;
                }
                if let Some(from) = self.properties.from_override {
                    return from;
                }
                endpoint.harvested.unwrap_or(epoch)
            }
            CycleMode::Retry => {
                if !endpoint.retry || endpoint.attempted == endpoint.harvested {
                    epoch
                } else {
                    endpoint.attempted.unwrap_or(epoch)
                }
            }
            CycleMode::Refresh => epoch,
        }
    }

    /// Record an attempt outcome and flush the overview. The in-memory
    /// update is applied before the flush so an in-process retry still
    /// observes progress when persistence fails.
    pub async fn record_attempt(&self, uri: &str, success: bool) -> Result<(), OverviewError> {
        let mut state = self.inner.lock().await;
        let now = Utc::now();
        if let Some(endpoint) = state
            .overview
            .endpoints
            .iter_mut()
            .find(|e| e.uri == uri)
        {
            endpoint.attempted = Some(now);
            if success {
                endpoint.harvested = Some(now);
            }
        }
        state.overview.store(&self.path).await
    }

    /// Snapshot of every endpoint, for status reporting.
    pub async fn endpoints(&self) -> Vec<Endpoint> {
        self.inner.lock().await.overview.endpoints.clone()
    }
}
