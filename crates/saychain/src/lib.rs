//! saychain: look-and-say iterations streamed through a chain of worker
//! processes.

mod version;

pub mod bridge;
pub mod channel;
pub mod config;
pub mod encoder;
pub mod logging;
pub mod observer;
pub mod orchestrator;
pub mod segment;
pub mod spawn;
pub mod worker;

pub use orchestrator::{ChainError, ChainReport, Orchestrator, event_loop};

pub use bridge::protocol::{END_MARKER, ProtocolError, Run, Segment};
pub use channel::{ChannelError, ChannelOutput, ChannelState, WorkerChannel, connect_with_retry};
pub use config::{ChainConfig, ChannelConfig, ConfigError};
pub use encoder::{RunEncoder, look_and_say};
pub use observer::{ChainObserver, NoopObserver};
pub use segment::SegmentBuffer;
pub use spawn::{CommandSpawner, SpawnError, WorkerSpawnConfig, WorkerSpawner};
pub use version::{SAYCHAIN_VERSION, VersionInfo};
pub use worker::{WorkerConfig, WorkerError, WorkerSummary, run_worker};
