//! Tracing setup for the orchestrator and worker processes.
//!
//! Workers share the orchestrator's stderr, so by default they only report
//! errors and leave lifecycle logging to the orchestrator side.
//!
//! - `RUST_LOG` overrides everything.
//! - `SAYCHAIN_LOG` sets the orchestrator level (default `warn`).
//! - `SAYCHAIN_WORKER_LOG` sets the worker level (default `error`).
//! - `LOG_FORMAT=json` switches both to JSON lines.

use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Which process is logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRole {
    Orchestrator,
    Worker,
}

impl LogRole {
    fn level_var(self) -> &'static str {
        match self {
            Self::Orchestrator => "SAYCHAIN_LOG",
            Self::Worker => "SAYCHAIN_WORKER_LOG",
        }
    }

    fn default_level(self) -> &'static str {
        match self {
            Self::Orchestrator => "warn",
            Self::Worker => "error",
        }
    }
}

/// Filter directives for `role` when `RUST_LOG` is unset.
fn directives(role: LogRole, lookup: impl Fn(&str) -> Option<String>) -> String {
    let level = match lookup(role.level_var()).as_deref().map(str::trim) {
        Some(level @ ("trace" | "debug" | "info" | "warn" | "error")) => level.to_string(),
        Some("warning") => "warn".to_string(),
        _ => role.default_level().to_string(),
    };

    match role {
        LogRole::Orchestrator => format!("saychain={level},saychain_cli={level}"),
        // Channel-side modules never run inside a worker.
        LogRole::Worker => format!("saychain::worker={level},saychain_worker={level}"),
    }
}

/// Install the global subscriber for `role`, writing to stderr.
///
/// stdout belongs to the run report. Calling this twice is harmless; the
/// second call is ignored.
pub fn init_tracing(role: LogRole) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::new(directives(role, |var| std::env::var(var).ok())),
    };

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(role == LogRole::Orchestrator);
    let layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        layer.json().boxed()
    } else {
        layer.boxed()
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init();
}
