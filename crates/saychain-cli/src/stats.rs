//! Run statistics printed after a successful chain.

use std::fmt;
use std::time::Duration;

use saychain::{ChainReport, VersionInfo};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub elapsed_secs: f64,
    pub sequences: usize,
    pub final_len: u64,
    /// Peak resident set size of the orchestrator process, in KiB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_rss_kib: Option<u64>,
    pub version: VersionInfo,
}

impl RunStats {
    pub fn new(report: &ChainReport, elapsed: Duration, version: VersionInfo) -> Self {
        Self {
            elapsed_secs: elapsed.as_secs_f64(),
            sequences: report.sequences(),
            final_len: report.final_len(),
            peak_rss_kib: peak_rss_kib(),
            version,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "total: {:.6}", self.elapsed_secs)?;
        writeln!(f, "sequences: {}", self.sequences)?;
        write!(f, "final length: {}", self.final_len)?;
        if let Some(kib) = self.peak_rss_kib {
            write!(f, "\npeak memory: {:.1} MiB", kib as f64 / 1024.0)?;
        }
        Ok(())
    }
}

/// Peak resident set size of this process in KiB.
#[cfg(unix)]
pub fn peak_rss_kib() -> Option<u64> {
    use nix::sys::resource::{UsageWho, getrusage};

    let usage = getrusage(UsageWho::RUSAGE_SELF).ok()?;
    let max_rss = u64::try_from(usage.max_rss()).ok()?;

    #[cfg(target_os = "macos")]
    {
        // macOS: max_rss is in bytes
        Some(max_rss / 1024)
    }

    #[cfg(not(target_os = "macos"))]
    {
        // Linux: max_rss is in kilobytes
        Some(max_rss)
    }
}

#[cfg(not(unix))]
pub fn peak_rss_kib() -> Option<u64> {
    None
}
