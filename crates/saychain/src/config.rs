//! Chain configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::spawn::{CommandSpawner, WorkerSpawner};

/// First worker port; worker `i` listens on `base_port + i`.
pub const DEFAULT_BASE_PORT: u16 = 1337;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_CONNECT_INTERVAL: Duration = Duration::from_millis(5);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
/// Chunks in flight between two adjacent channels.
pub const DEFAULT_QUEUE_DEPTH: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("iteration count must be at least 1")]
    ZeroIterations,
    #[error("base port must be non-zero")]
    ZeroBasePort,
    #[error("{iterations} workers starting at port {base_port} run past port 65535")]
    PortRange { base_port: u16, iterations: usize },
    #[error("queue depth must be at least 1")]
    ZeroQueueDepth,
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Everything the orchestrator needs to build a chain.
///
/// Immutable once the chain is built; every channel gets its own
/// [`ChannelConfig`] derived from it.
#[derive(Clone)]
pub struct ChainConfig {
    pub iterations: usize,
    pub base_port: u16,
    pub connect_timeout: Duration,
    pub connect_interval: Duration,
    pub shutdown_grace: Duration,
    pub queue_depth: usize,
    /// Collect the last channel's output and return it from the run.
    pub buffer_output: bool,
    pub spawner: Arc<dyn WorkerSpawner>,
}

impl ChainConfig {
    pub fn new(iterations: usize) -> Self {
        Self {
            iterations,
            base_port: DEFAULT_BASE_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            connect_interval: DEFAULT_CONNECT_INTERVAL,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            buffer_output: false,
            spawner: Arc::new(CommandSpawner::default()),
        }
    }

    pub fn with_base_port(mut self, port: u16) -> Self {
        self.base_port = port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_connect_interval(mut self, interval: Duration) -> Self {
        self.connect_interval = interval;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    pub fn with_buffer_output(mut self, buffer: bool) -> Self {
        self.buffer_output = buffer;
        self
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn WorkerSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    /// Overlay `SAYCHAIN_BASE_PORT`, `SAYCHAIN_CONNECT_TIMEOUT_MS` and
    /// `SAYCHAIN_CONNECT_INTERVAL_MS` from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_with(|var| std::env::var(var).ok())
    }

    pub fn apply_env_with(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup("SAYCHAIN_BASE_PORT") {
            self.base_port = parse_env("SAYCHAIN_BASE_PORT", value)?;
        }
        if let Some(value) = lookup("SAYCHAIN_CONNECT_TIMEOUT_MS") {
            self.connect_timeout =
                Duration::from_millis(parse_env("SAYCHAIN_CONNECT_TIMEOUT_MS", value)?);
        }
        if let Some(value) = lookup("SAYCHAIN_CONNECT_INTERVAL_MS") {
            self.connect_interval =
                Duration::from_millis(parse_env("SAYCHAIN_CONNECT_INTERVAL_MS", value)?);
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if self.base_port == 0 {
            return Err(ConfigError::ZeroBasePort);
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::ZeroQueueDepth);
        }
        let last = u64::from(self.base_port) + self.iterations as u64 - 1;
        if last > u64::from(u16::MAX) {
            return Err(ConfigError::PortRange {
                base_port: self.base_port,
                iterations: self.iterations,
            });
        }
        Ok(())
    }

    /// Per-channel settings for chain position `index`.
    ///
    /// Only valid after [`validate`](Self::validate) has passed.
    pub(crate) fn channel(&self, index: usize) -> ChannelConfig {
        ChannelConfig {
            index,
            port: self.base_port + index as u16,
            connect_timeout: self.connect_timeout,
            connect_interval: self.connect_interval,
            shutdown_grace: self.shutdown_grace,
            buffer_output: self.buffer_output && index + 1 == self.iterations,
        }
    }
}

/// Settings for a single worker channel, fixed at construction.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub index: usize,
    pub port: u16,
    pub connect_timeout: Duration,
    pub connect_interval: Duration,
    pub shutdown_grace: Duration,
    pub buffer_output: bool,
}

impl ChannelConfig {
    pub fn new(index: usize, port: u16) -> Self {
        Self {
            index,
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            connect_interval: DEFAULT_CONNECT_INTERVAL,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            buffer_output: false,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_buffer_output(mut self, buffer: bool) -> Self {
        self.buffer_output = buffer;
        self
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}
