//! PrivStreams CLI entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration**: load `privstreams.toml` and apply command-line
//!    overrides.
//! 2. **Wire observability**: install the `tracing-subscriber` stack and, when
//!    an endpoint is configured, the OpenTelemetry OTLP exporter. All spans and
//!    events emitted by every crate in the workspace flow through it.
//! 3. **Construct the host**: a [`host::ConsoleHost`] holding the grants for
//!    this process, plus the task that answers runtime grant requests.
//! 4. **Run the location query**: declare a `Feature` purpose for a simulated
//!    location source, run a map → for-each pipeline, print each fix as one
//!    JSON line on stdout, and stop everything after the configured number of
//!    fixes or on Ctrl-C.

mod config;
mod host;
mod observability;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use engine::QueryEngine;
use location::{
    LastKnownLocation, LocationLevel, LocationService, LocationUpdates, SimulatedLocationService,
};
use streams::{GrantTable, Item, Purpose, Source, StageError};
use tokio::sync::mpsc;

use crate::config::{CliConfig, LogFormat, PromptMode};
use crate::host::ConsoleHost;

/// Decimal places kept when coarsening coordinates for display.
const DISPLAY_PRECISION: i32 = 4;

/// PrivStreams: purpose-bound, permission-gated personal data queries.
#[derive(Parser, Debug)]
#[command(name = "privstreams")]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file (default: ./privstreams.toml, if present)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Grant a capability at start-up (repeatable)
    #[arg(long = "grant", value_name = "CAP")]
    grants: Vec<String>,

    /// Pretend the host cannot prompt for capabilities at runtime
    #[arg(long)]
    no_runtime_requests: bool,

    /// How runtime grant requests are answered
    #[arg(long, value_enum, value_name = "MODE")]
    prompt: Option<PromptMode>,

    /// Location granularity (country, city, neighborhood, building, meter)
    #[arg(long, value_name = "LEVEL")]
    level: Option<LocationLevel>,

    /// Milliseconds between location updates
    #[arg(long, value_name = "MS")]
    interval_ms: Option<u64>,

    /// Stop after this many fixes
    #[arg(long, value_name = "N")]
    updates: Option<usize>,

    /// Read the last known fix once instead of subscribing to updates
    #[arg(long)]
    single_shot: bool,

    /// Log output format
    #[arg(long, value_enum, value_name = "FMT")]
    log_format: Option<LogFormat>,
}

impl Args {
    /// Applies command-line overrides; flags win over the file.
    fn apply(&self, config: &mut CliConfig) -> Result<()> {
        config.host.granted.extend(self.grants.iter().cloned());
        if self.no_runtime_requests {
            config.host.runtime_requests = false;
        }
        if let Some(prompt) = self.prompt {
            config.host.prompt = prompt;
        }
        if let Some(level) = self.level {
            config.location.level = level;
        }
        if let Some(interval_ms) = self.interval_ms {
            config.location.interval_ms = interval_ms;
        }
        if let Some(updates) = self.updates {
            config.location.updates = updates;
        }
        if self.single_shot {
            config.location.single_shot = true;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        config.validate()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = CliConfig::load(args.config.as_deref())?;
    args.apply(&mut config)?;

    let telemetry = observability::init(&config.logging)?;
    tracing::debug!(?config, "Configuration loaded");

    let result = run(config).await;
    if let Err(err) = &result {
        tracing::error!(error = %err, "Run failed");
    }
    telemetry.shutdown();
    result
}

async fn run(config: CliConfig) -> Result<()> {
    let grants = GrantTable::with_granted(config.host.capabilities()?);
    let (host, grant_queue) = ConsoleHost::new(grants, config.host.runtime_requests);
    let engine = QueryEngine::new(host.clone(), config.engine.clone());
    let grant_loop = host::spawn_grant_loop(
        Arc::clone(&engine),
        Arc::clone(&host),
        host::prompter(config.host.prompt),
        grant_queue,
    );

    let service: Arc<dyn LocationService> = Arc::new(SimulatedLocationService::new(
        SimulatedLocationService::sample_track(),
    )?);
    let level = config.location.level;
    let (source, expected) = if config.location.single_shot {
        (Source::new(LastKnownLocation::new(service, level)), 1)
    } else {
        let interval = Duration::from_millis(config.location.interval_ms);
        let provider = LocationUpdates::new(service, interval, level)?;
        (Source::new(provider), config.location.updates)
    };

    let (fixes, mut received) = mpsc::unbounded_channel::<Item>();
    let pipeline = engine
        .get_data(&source, Purpose::feature("Show the device position"))
        .map("coarsen", coarsen)
        .for_each("print", move |item| {
            fixes
                .send(item.clone())
                .map_err(|_| StageError::new("output closed"))
        })?;
    tracing::info!(query = %pipeline.id(), provider = %source.name(), %level, "Location query submitted");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut poll = tokio::time::interval(Duration::from_millis(100));
    let mut count = 0;

    while count < expected {
        tokio::select! {
            item = received.recv() => match item {
                Some(item) => {
                    println!("{}", serde_json::to_string(&item)?);
                    count += 1;
                }
                None => break,
            },
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted");
                break;
            }
            _ = poll.tick() => {
                if pipeline.state().is_terminal() {
                    while let Ok(item) = received.try_recv() {
                        println!("{}", serde_json::to_string(&item)?);
                        count += 1;
                    }
                    break;
                }
            }
        }
    }

    engine.stop_all();
    grant_loop.abort();

    eprintln!("Received {count} location fix(es)");
    if let Some(failure) = source.failure() {
        eprintln!("Provider failure: {failure}");
    }
    if let Some(failure) = engine.last_failure() {
        eprintln!("Last failure: {failure}");
    }
    Ok(())
}

/// Rounds the coordinates of a fix for display.
fn coarsen(mut item: Item) -> Result<Item, StageError> {
    let factor = 10f64.powi(DISPLAY_PRECISION);
    for field in [location::geo::LATITUDE, location::geo::LONGITUDE] {
        let value = item
            .get_f64(field)
            .ok_or_else(|| StageError::new(format!("fix has no {field}")))?;
        item.set(field, (value * factor).round() / factor);
    }
    Ok(item)
}
