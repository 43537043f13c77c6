//! Worker process spawning.
//!
//! The worker is a separate binary (`saychain-worker <port>`). By default it
//! is looked up next to the running executable, which is where cargo puts
//! every binary of the workspace.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};

/// File name of the worker binary.
pub const WORKER_BIN: &str = "saychain-worker";

/// What a spawner needs to start the worker for one chain position.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSpawnConfig {
    pub index: usize,
    pub port: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("failed to spawn {program}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("spawn failed: {0}")]
    Other(String),
}

/// Extension point for different worker spawn strategies.
///
/// Implementations must return a child that will listen on `config.port`;
/// the channel owns the child from then on and reaps it on teardown.
pub trait WorkerSpawner: Send + Sync {
    fn spawn(&self, config: &WorkerSpawnConfig) -> Result<Child, SpawnError>;
}

/// Spawns the worker binary with the port as its only argument.
#[derive(Debug, Clone)]
pub struct CommandSpawner {
    program: PathBuf,
}

impl CommandSpawner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Default for CommandSpawner {
    fn default() -> Self {
        Self::new(default_worker_program())
    }
}

impl WorkerSpawner for CommandSpawner {
    fn spawn(&self, config: &WorkerSpawnConfig) -> Result<Child, SpawnError> {
        tracing::debug!(
            index = config.index,
            port = config.port,
            program = %self.program.display(),
            "Spawning worker"
        );

        Command::new(&self.program)
            .arg(config.port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SpawnError::Spawn {
                program: self.program.clone(),
                source,
            })
    }
}

/// `saychain-worker` next to the current executable, or bare (resolved via
/// PATH) when the executable path is unknown.
pub fn default_worker_program() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(WORKER_BIN)))
        .unwrap_or_else(|| PathBuf::from(WORKER_BIN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_program_is_worker_binary() {
        let spawner = CommandSpawner::default();
        assert_eq!(
            spawner.program().file_name().and_then(|n| n.to_str()),
            Some(WORKER_BIN)
        );
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let spawner = CommandSpawner::new("/nonexistent/saychain-worker");
        let err = spawner
            .spawn(&WorkerSpawnConfig {
                index: 0,
                port: 1337,
            })
            .unwrap_err();
        assert!(matches!(err, SpawnError::Spawn { .. }));
    }
}
