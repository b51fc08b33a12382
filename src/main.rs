// Eventharvest CLI: run the scraping orchestrator over the configured
// source list and exit with a status reflecting the run summary.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use eventharvest::config::HarvestConfig;
use eventharvest::coordinator::{RunCoordinator, RunStatus};

const USAGE: &str = "\
eventharvest - resilient event-listing harvester

USAGE:
    eventharvest [OPTIONS]

OPTIONS:
    --config <PATH>     JSON configuration file (defaults are used when absent)
    --sources <PATH>    JSON source list (overrides the config value)
    --workers <N>       Bounded worker count
    --source <ID>       Restrict the run to one source id (repeatable)
    --no-cache          Force cache misses without invalidating entries
    --dry-run           Fetch without committing cache writes or backups
    -h, --help          Print this help
";

struct CliArgs {
    config_path: Option<PathBuf>,
    sources_path: Option<PathBuf>,
    workers: Option<usize>,
    subset: Vec<String>,
    no_cache: bool,
    dry_run: bool,
}

fn parse_args() -> Result<Option<CliArgs>> {
    let mut args = CliArgs {
        config_path: None,
        sources_path: None,
        workers: None,
        subset: Vec::new(),
        no_cache: false,
        dry_run: false,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let value = iter.next().context("--config requires a path")?;
                args.config_path = Some(PathBuf::from(value));
            }
            "--sources" => {
                let value = iter.next().context("--sources requires a path")?;
                args.sources_path = Some(PathBuf::from(value));
            }
            "--workers" => {
                let value = iter.next().context("--workers requires a number")?;
                args.workers = Some(value.parse().context("--workers must be a number")?);
            }
            "--source" => {
                let value = iter.next().context("--source requires an id")?;
                args.subset.push(value);
            }
            "--no-cache" => args.no_cache = true,
            "--dry-run" => args.dry_run = true,
            "-h" | "--help" => {
                print!("{USAGE}");
                return Ok(None);
            }
            other => anyhow::bail!("unknown argument: {other} (see --help)"),
        }
    }

    Ok(Some(args))
}

fn build_config(args: &CliArgs) -> Result<HarvestConfig> {
    let mut config = match &args.config_path {
        Some(path) => HarvestConfig::from_file(path)?,
        None => HarvestConfig::default(),
    };

    if let Some(path) = &args.sources_path {
        config = config.with_sources_file(path);
    }
    if args.no_cache {
        config = config.with_bypass_cache(true);
    }
    if args.dry_run {
        config = config.with_dry_run(true);
    }
    if let Some(workers) = args.workers {
        config = config.with_workers(workers).context("invalid --workers")?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = match parse_args() {
        Ok(Some(args)) => args,
        Ok(None) => return ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::from(2);
        }
    };

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::from(2);
        }
    };

    let coordinator = match RunCoordinator::new(config) {
        Ok(coordinator) => coordinator,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::from(2);
        }
    };

    // Ctrl-C requests cooperative cancellation: in-flight fetches finish
    // or time out, partial results are still emitted
    let cancel = coordinator.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("cancellation requested, finishing in-flight fetches");
            cancel.cancel();
        }
    });

    let subset = (!args.subset.is_empty()).then_some(args.subset.as_slice());
    match coordinator.run(subset).await {
        Ok((_events, summary)) => match summary.status {
            RunStatus::Success => ExitCode::SUCCESS,
            RunStatus::Degraded => ExitCode::from(1),
        },
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(2)
        }
    }
}
