//! Orchestrator - builds the worker chain and drives it to completion.
//!
//! Flow:
//! 1. Build N idle channels; channel i's output queue is channel i+1's input
//! 2. Start one driver task per channel on the event loop
//! 3. Inject `input + "\n"` into channel 0
//! 4. Wait for every driver; on the first failure abort the rest
//!
//! ```text
//!   input ─▶ [queue 0] ─▶ channel 0 ─▶ worker 0 ─▶ [queue 1] ─▶ channel 1 ─▶ … ─▶ channel N-1
//! ```
//!
//! Queues are bounded, so a slow stage backs up into the stages before it.

use std::io;
use std::sync::Arc;

use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::bytes::Bytes;

use crate::bridge::protocol::{END_MARKER, ProtocolError, validate_digits};
use crate::channel::{ChannelError, ChannelOutput, WorkerChannel};
use crate::config::{ChainConfig, ConfigError};
use crate::observer::{ChainObserver, NoopObserver};

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("invalid chain configuration")]
    Config(#[from] ConfigError),
    #[error("invalid input sequence")]
    Input(#[source] ProtocolError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("channel task failed: {0}")]
    Task(String),
}

/// Result of a completed chain run.
#[derive(Debug, Clone)]
pub struct ChainReport {
    /// Per-channel counters, in chain order.
    pub channels: Vec<ChannelOutput>,
    /// Final term without the end marker, if output buffering was configured.
    pub output: Option<Bytes>,
}

impl ChainReport {
    /// Number of look-and-say terms produced.
    pub fn sequences(&self) -> usize {
        self.channels.len()
    }

    /// Length of the final term in digits.
    pub fn final_len(&self) -> u64 {
        self.channels
            .last()
            .map(|c| c.bytes_out.saturating_sub(1))
            .unwrap_or(0)
    }
}

/// Build the single-threaded event loop the orchestrator and workers run on.
pub fn event_loop() -> io::Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

pub struct Orchestrator {
    config: ChainConfig,
    observer: Arc<dyn ChainObserver>,
}

impl Orchestrator {
    pub fn new(config: ChainConfig) -> Result<Self, ChainError> {
        config.validate()?;
        Ok(Self {
            config,
            observer: Arc::new(NoopObserver),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn ChainObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn iterations(&self) -> usize {
        self.config.iterations
    }

    /// Run the chain on `runtime`, blocking the calling thread until every
    /// channel has drained or the chain has failed.
    pub fn start(&self, runtime: &Runtime, input: &str) -> Result<ChainReport, ChainError> {
        runtime.block_on(self.run(input))
    }

    /// Run `input` through the whole chain.
    ///
    /// Any channel failure aborts every other channel (reclaiming their
    /// workers) before the error is returned. There are no partial results.
    pub async fn run(&self, input: &str) -> Result<ChainReport, ChainError> {
        validate_digits(input.as_bytes()).map_err(ChainError::Input)?;

        let (input_tx, chain) = self.build_chain();
        tracing::info!(
            iterations = self.config.iterations,
            base_port = self.config.base_port,
            input_len = input.len(),
            "Starting chain"
        );

        let mut tasks = JoinSet::new();
        for (channel, inbound) in chain {
            tasks.spawn(drive_channel(channel, inbound));
        }

        let mut stream = Vec::with_capacity(input.len() + 1);
        stream.extend_from_slice(input.as_bytes());
        stream.push(END_MARKER);
        if input_tx.send(Bytes::from(stream)).await.is_err() {
            tracing::warn!("First channel stopped before input was injected");
        }
        drop(input_tx);

        let mut outputs: Vec<Option<ChannelOutput>> = vec![None; self.config.iterations];
        while let Some(joined) = tasks.join_next().await {
            let failure = match joined {
                Ok(Ok(output)) => {
                    let index = output.index;
                    outputs[index] = Some(output);
                    continue;
                }
                Ok(Err(e)) => ChainError::Channel(e),
                Err(e) => ChainError::Task(e.to_string()),
            };

            tracing::error!(error = %failure, "Chain failed, aborting remaining channels");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
            return Err(failure);
        }

        let channels: Vec<ChannelOutput> = outputs.into_iter().flatten().collect();
        if channels.len() != self.config.iterations {
            return Err(ChainError::Task(format!(
                "{} of {} channels reported",
                channels.len(),
                self.config.iterations
            )));
        }

        let output = channels.last().and_then(|c| c.buffered.clone());
        tracing::info!(sequences = channels.len(), "Chain complete");
        Ok(ChainReport { channels, output })
    }

    /// Create the idle channels and the queues linking them.
    ///
    /// Returns the sender for the first channel's input and, for every
    /// channel, the receiver it drains.
    fn build_chain(&self) -> (mpsc::Sender<Bytes>, Vec<(WorkerChannel, mpsc::Receiver<Bytes>)>) {
        let n = self.config.iterations;
        let depth = self.config.queue_depth;

        let (input_tx, mut inbound) = mpsc::channel::<Bytes>(depth);
        let mut chain = Vec::with_capacity(n);

        for index in 0..n {
            let (downstream, next_inbound) = if index + 1 < n {
                let (tx, rx) = mpsc::channel::<Bytes>(depth);
                (Some(tx), Some(rx))
            } else {
                (None, None)
            };

            let channel = WorkerChannel::new(
                self.config.channel(index),
                Arc::clone(&self.config.spawner),
                Arc::clone(&self.observer),
                downstream,
            );
            chain.push((channel, inbound));

            match next_inbound {
                Some(rx) => inbound = rx,
                None => break,
            }
        }

        (input_tx, chain)
    }
}

/// Feed one channel from its inbound queue until upstream is done, then
/// finish it.
///
/// The read side of the channel keeps running while writes are pending, so
/// the worker's output never backs up behind its input.
async fn drive_channel(
    mut channel: WorkerChannel,
    mut inbound: mpsc::Receiver<Bytes>,
) -> Result<ChannelOutput, ChannelError> {
    let mut worker_done = false;

    loop {
        tokio::select! {
            chunk = inbound.recv() => match chunk {
                Some(chunk) => channel.write(&chunk).await?,
                None => break,
            },
            clean = channel.closed(), if !worker_done => {
                if !clean {
                    break;
                }
                // Upstream must still drain before this channel may complete.
                worker_done = true;
            }
        }
    }

    channel.finish().await
}
