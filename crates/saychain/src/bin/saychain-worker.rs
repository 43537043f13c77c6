//! Worker process: `saychain-worker <port>`.
//!
//! Serves exactly one look-and-say iteration on 127.0.0.1:<port>, then exits.

use std::process;

use saychain::logging::{self, LogRole};
use saychain::{WorkerConfig, event_loop, run_worker};
use tracing::Instrument;

const USAGE: &str = "Usage: saychain-worker <port>";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Serve(u16),
    Help,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let port = match parse_args(&args) {
        Ok(Command::Serve(port)) => port,
        Ok(Command::Help) => {
            println!("{USAGE}");
            println!();
            println!("Serves one look-and-say iteration on 127.0.0.1:<port>, then exits.");
            return;
        }
        Err(msg) => {
            eprintln!("error: {msg}");
            eprintln!();
            eprintln!("{USAGE}");
            process::exit(2);
        }
    };

    logging::init_tracing(LogRole::Worker);

    if let Err(e) = run(port) {
        tracing::error!(port, error = %e, "Worker failed");
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let mut port: Option<u16> = None;

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => return Ok(Command::Help),
            arg if arg.starts_with('-') => return Err(format!("unknown flag: {arg}")),
            arg => {
                if port.is_some() {
                    return Err(format!("unexpected argument: {arg}"));
                }
                let parsed = arg
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port '{arg}'"))?;
                if parsed == 0 {
                    return Err("port must be non-zero".to_string());
                }
                port = Some(parsed);
            }
        }
    }

    port.map(Command::Serve)
        .ok_or_else(|| "missing required argument: <port>".to_string())
}

fn run(port: u16) -> anyhow::Result<()> {
    let runtime = event_loop()?;
    let span = tracing::info_span!("worker", port, pid = process::id());
    let summary = runtime.block_on(run_worker(WorkerConfig::new(port)).instrument(span))?;
    tracing::debug!(port, bytes_in = summary.bytes_in, runs = summary.runs, "Worker exiting");
    Ok(())
}
