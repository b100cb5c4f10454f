//! Top-level loop: consult the cycle for endpoints and dispatch workers,
//! bounded by the concurrency semaphore.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::HarvestConfig;
use crate::cycle::{Cycle, OverviewError};
use crate::worker::Worker;

#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Run a full cycle: dispense endpoints until the cycle has none left,
/// then wait for every worker. Endpoint dispatch blocks on the semaphore
/// so at most `concurrency` harvests are in flight.
pub async fn run_cycle(
    cycle: Arc<Cycle>,
    config: Arc<HarvestConfig>,
    shutdown: Arc<AtomicBool>,
) -> Result<RunSummary, OverviewError> {
    let semaphore = Arc::new(Semaphore::new(cycle.properties().concurrency));
    let mut handles = Vec::new();

    while let Some(endpoint) = cycle.next().await {
        if shutdown.load(Ordering::Relaxed) {
            info!("shutdown requested, not dispatching further endpoints");
            break;
        }
        if config.provider_for(&endpoint.uri).is_none() {
            warn!(
                "endpoint {} is in the overview but not in the configuration, skipping",
                endpoint.uri
            );
            continue;
        }
        if !cycle.do_harvest(&endpoint) {
            info!("cycle skips {}", endpoint.uri);
            continue;
        }
        handles.push(dispatch(&semaphore, &cycle, &config, &shutdown, endpoint).await);
    }

    collect(handles).await
}

/// Run one endpoint, creating its overview entry if needed.
pub async fn run_endpoint(
    cycle: Arc<Cycle>,
    config: Arc<HarvestConfig>,
    shutdown: Arc<AtomicBool>,
    uri: &str,
    group: &str,
) -> Result<RunSummary, OverviewError> {
    let semaphore = Arc::new(Semaphore::new(1));
    let endpoint = cycle.next_for(uri, group).await;
    if !cycle.do_harvest(&endpoint) {
        info!("cycle skips {}", endpoint.uri);
        return Ok(RunSummary::default());
    }
    let handle = dispatch(&semaphore, &cycle, &config, &shutdown, endpoint).await;
    collect(vec![handle]).await
}

async fn dispatch(
    semaphore: &Arc<Semaphore>,
    cycle: &Arc<Cycle>,
    config: &Arc<HarvestConfig>,
    shutdown: &Arc<AtomicBool>,
    endpoint: crate::cycle::Endpoint,
) -> JoinHandle<Result<bool, OverviewError>> {
    let permit = semaphore
        .clone()
        .acquire_owned()
        .await
        .expect("worker pool semaphore closed");
    let worker = Worker::new(cycle.clone(), config.clone(), shutdown.clone());
    tokio::spawn(async move {
        let _permit = permit;
        worker.run(endpoint).await
    })
}

async fn collect(
    handles: Vec<JoinHandle<Result<bool, OverviewError>>>,
) -> Result<RunSummary, OverviewError> {
    let mut summary = RunSummary::default();
    let mut fatal = None;
    for handle in handles {
        summary.attempted += 1;
        match handle.await {
            Ok(Ok(true)) => summary.succeeded += 1,
            Ok(Ok(false)) => summary.failed += 1,
            Ok(Err(error)) => {
                summary.failed += 1;
                fatal = Some(error);
            }
            Err(join_error) => {
                error!("worker task failed: {join_error}");
                summary.failed += 1;
            }
        }
    }
    match fatal {
        Some(error) => Err(error),
        None => Ok(summary),
    }
}
