//! saychain - compute look-and-say iterations through a chain of worker
//! processes.
//!
//! ```text
//! saychain <sequence> <iterations> [--print] [--json]
//! ```

mod progress;
mod stats;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use saychain::logging::{self, LogRole};
use saychain::{ChainConfig, CommandSpawner, Orchestrator, VersionInfo, event_loop};

use crate::progress::ProgressObserver;
use crate::stats::RunStats;

#[derive(Parser, Debug)]
#[command(name = "saychain")]
#[command(version, about = "Look-and-say iterations streamed through a chain of worker processes")]
struct Args {
    /// Starting term, digits only
    #[arg(value_parser = parse_sequence)]
    sequence: String,

    /// Number of iterations (one worker process each)
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    iterations: u32,

    /// Print the final term to stdout
    #[arg(long)]
    print: bool,

    /// Print run statistics as JSON
    #[arg(long)]
    json: bool,

    /// First worker port; overrides SAYCHAIN_BASE_PORT
    #[arg(long)]
    base_port: Option<u16>,

    /// Connect budget per worker in milliseconds; overrides SAYCHAIN_CONNECT_TIMEOUT_MS
    #[arg(long)]
    connect_timeout_ms: Option<u64>,

    /// Worker binary (defaults to saychain-worker next to this executable)
    #[arg(long)]
    worker: Option<PathBuf>,
}

fn parse_sequence(value: &str) -> Result<String, String> {
    if value.is_empty() {
        return Err("sequence must not be empty".to_string());
    }
    if let Some(c) = value.chars().find(|c| !c.is_ascii_digit()) {
        return Err(format!("sequence must contain only digits, found {c:?}"));
    }
    Ok(value.to_string())
}

fn main() {
    let args = Args::parse();
    logging::init_tracing(LogRole::Orchestrator);

    if let Err(e) = run(args) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = build_config(&args)?;
    let spawner = match &args.worker {
        Some(path) => CommandSpawner::new(path),
        None => CommandSpawner::default(),
    };
    let version = VersionInfo::new().with_worker(spawner.program().display().to_string());

    let iterations = config.iterations;
    let progress = Arc::new(ProgressObserver::new(iterations));
    let orchestrator = Orchestrator::new(config.with_spawner(Arc::new(spawner)))?
        .with_observer(progress.clone());

    let runtime = event_loop().context("failed to build event loop")?;
    let start = Instant::now();
    let report = orchestrator.start(&runtime, &args.sequence)?;
    let elapsed = start.elapsed();
    tracing::debug!(completed = progress.completed(), "Progress at exit");

    if args.print
        && let Some(output) = &report.output
    {
        println!("{}", String::from_utf8_lossy(output));
    }

    let stats = RunStats::new(&report, elapsed, version);
    if args.json {
        println!("{}", stats.to_json()?);
    } else {
        println!("{stats}");
    }
    Ok(())
}

/// Defaults, then environment, then flags.
fn build_config(args: &Args) -> Result<ChainConfig> {
    let mut config = ChainConfig::new(args.iterations as usize)
        .with_buffer_output(args.print)
        .apply_env()?;
    if let Some(port) = args.base_port {
        config = config.with_base_port(port);
    }
    if let Some(ms) = args.connect_timeout_ms {
        config = config.with_connect_timeout(Duration::from_millis(ms));
    }
    config.validate()?;
    Ok(config)
}
