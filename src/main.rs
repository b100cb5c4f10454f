use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Args, Parser, Subcommand, command};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use harvester::{
    Cycle, HarvestConfig, RunSummary, expand_path, run_cycle, run_endpoint,
};

const EXIT_HARVEST_FAILED: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_PERSISTENCE_ERROR: u8 = 3;

/// OAI-PMH cycle harvester
#[derive(Debug, Parser)]
#[command(name = "harvester")]
#[command(about = "OAI-PMH cycle harvester", long_about = None)]
struct Cli {
    /// Harvester configuration file
    #[arg(short, long, default_value = "config.xml", env = "HARVESTER_CONFIG")]
    config: PathBuf,

    /// Endpoint overview file
    #[arg(long, default_value = "overview.xml", env = "HARVESTER_OVERVIEW")]
    overview: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a full harvesting cycle over all configured endpoints
    Run,
    /// Harvest a single endpoint
    #[command(arg_required_else_help = true)]
    Endpoint(EndpointArgs),
    /// Dump the endpoint overview
    Status,
}

#[derive(Debug, Args)]
struct EndpointArgs {
    /// OAI endpoint url
    endpoint: String,

    /// Endpoint group
    #[arg(short, long, default_value = "")]
    group: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Cli::parse();

    let config = match HarvestConfig::load(&expand_path(&args.config)) {
        Ok(config) => Arc::new(config),
        Err(error) => {
            error!("{error}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let cycle = match Cycle::load(
        expand_path(&args.overview),
        config.properties.clone(),
        &config.providers,
    ) {
        Ok(cycle) => Arc::new(cycle),
        Err(error) => {
            error!("{error}");
            return ExitCode::from(EXIT_PERSISTENCE_ERROR);
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_shutdown_listener(shutdown.clone());

    let outcome = match args.command {
        Commands::Run => run_cycle(cycle, config, shutdown).await,
        Commands::Endpoint(endpoint) => {
            run_endpoint(cycle, config, shutdown, &endpoint.endpoint, &endpoint.group).await
        }
        Commands::Status => {
            print_status(&cycle).await;
            return ExitCode::SUCCESS;
        }
    };

    match outcome {
        Ok(summary) => {
            report(&summary);
            if summary.all_succeeded() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_HARVEST_FAILED)
            }
        }
        Err(error) => {
            error!("{error}");
            ExitCode::from(EXIT_PERSISTENCE_ERROR)
        }
    }
}

fn spawn_shutdown_listener(shutdown: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, workers will stop after the current record");
            shutdown.store(true, Ordering::Relaxed);
        }
    });
}

fn report(summary: &RunSummary) {
    info!(
        "cycle finished: {} attempted, {} succeeded, {} failed",
        summary.attempted, summary.succeeded, summary.failed
    );
}

async fn print_status(cycle: &Cycle) {
    for endpoint in cycle.endpoints().await {
        let attempted = endpoint
            .attempted
            .map(harvester::oai::format_datestamp)
            .unwrap_or_else(|| "-".to_string());
        let harvested = endpoint
            .harvested
            .map(harvester::oai::format_datestamp)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}\tgroup={}\tblocked={}\tretry={}\tincremental={}\tattempted={}\tharvested={}",
            endpoint.uri,
            if endpoint.group.is_empty() {
                "-"
            } else {
                &endpoint.group
            },
            endpoint.blocked,
            endpoint.retry,
            endpoint.allow_incremental_harvest,
            attempted,
            harvested
        );
    }
}
