//! Worker channel - the orchestrator's handle to one worker process.
//!
//! Lifecycle:
//! 1. Idle: constructed by the orchestrator, no process yet
//! 2. Connecting: first `write` spawns the worker and polls its port
//! 3. Connected: writes go to the socket; a reader task forwards output
//! 4. Closing: the worker closed its end, the child is being stopped
//! 5. Closed: child reaped (or startup failed)
//!
//! The read side runs as its own task so that a stalled write to the worker
//! never stops us from draining the worker's output.

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::bytes::{Bytes, BytesMut};
use tokio_util::codec::FramedRead;

use crate::bridge::codec::DigitStreamCodec;
use crate::bridge::protocol::{END_MARKER, ProtocolError};
use crate::config::ChannelConfig;
use crate::observer::ChainObserver;
use crate::spawn::{SpawnError, WorkerSpawnConfig, WorkerSpawner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Connected,
    Closing,
    Closed,
}

impl ChannelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel {index}: worker spawn failed")]
    Spawn {
        index: usize,
        #[source]
        source: SpawnError,
    },
    #[error("channel {index}: worker unreachable")]
    ConnectTimeout {
        index: usize,
        #[source]
        source: ConnectError,
    },
    #[error("channel {index}: worker exited during startup ({status})")]
    WorkerExited { index: usize, status: ExitStatus },
    #[error("channel {index}: write to worker failed")]
    Write {
        index: usize,
        #[source]
        source: io::Error,
    },
    #[error("channel {index}: bad worker output")]
    Protocol {
        index: usize,
        #[source]
        source: ProtocolError,
    },
    #[error("channel {index}: downstream channel closed")]
    DownstreamClosed { index: usize },
    #[error("channel {index}: output reader failed: {message}")]
    Reader { index: usize, message: String },
    #[error("channel {index}: failed to stop worker")]
    Reap {
        index: usize,
        #[source]
        source: io::Error,
    },
    #[error("channel {index}: cannot {operation} while {state}")]
    InvalidState {
        index: usize,
        state: ChannelState,
        operation: &'static str,
    },
}

impl ChannelError {
    pub fn index(&self) -> usize {
        match self {
            Self::Spawn { index, .. }
            | Self::ConnectTimeout { index, .. }
            | Self::WorkerExited { index, .. }
            | Self::Write { index, .. }
            | Self::Protocol { index, .. }
            | Self::DownstreamClosed { index }
            | Self::Reader { index, .. }
            | Self::Reap { index, .. }
            | Self::InvalidState { index, .. } => *index,
        }
    }
}

/// Nothing accepted connections on `addr` within the connect budget.
#[derive(Debug, thiserror::Error)]
#[error("no listener on {addr} after {attempts} attempts in {budget:?}")]
pub struct ConnectError {
    pub addr: SocketAddr,
    pub attempts: u32,
    pub budget: Duration,
    #[source]
    pub last_error: io::Error,
}

/// Connect to `addr`, retrying every `interval` until `budget` has elapsed.
///
/// A freshly spawned worker has no way to announce readiness, so polling the
/// port is the only wait available before its socket exists.
pub async fn connect_with_retry(
    addr: SocketAddr,
    budget: Duration,
    interval: Duration,
) -> Result<TcpStream, ConnectError> {
    let deadline = Instant::now() + budget;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());
        let last_error = match tokio::time::timeout(remaining, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                tracing::trace!(%addr, attempts, "Connected");
                return Ok(stream);
            }
            Ok(Err(e)) => e,
            Err(_) => io::Error::new(io::ErrorKind::TimedOut, "connect attempt timed out"),
        };

        let now = Instant::now();
        if now >= deadline {
            return Err(ConnectError {
                addr,
                attempts,
                budget,
                last_error,
            });
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

/// What a channel produced, returned by [`WorkerChannel::finish`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelOutput {
    pub index: usize,
    /// Bytes written to the worker, end marker included.
    pub bytes_in: u64,
    /// Bytes received from the worker, end marker included.
    pub bytes_out: u64,
    /// Received digits without the end marker, if buffering was configured.
    pub buffered: Option<Bytes>,
}

struct ReaderOutput {
    bytes: u64,
    buffered: Option<BytesMut>,
}

type ReaderResult = Result<ReaderOutput, ChannelError>;

/// The output pump for one connection. Aborted on drop.
struct ReaderTask {
    index: usize,
    handle: JoinHandle<ReaderResult>,
    outcome: Option<ReaderResult>,
}

impl ReaderTask {
    fn spawn(
        index: usize,
        read_half: OwnedReadHalf,
        observer: Arc<dyn ChainObserver>,
        downstream: Option<mpsc::Sender<Bytes>>,
        buffer: bool,
    ) -> Self {
        let handle = tokio::spawn(pump_output(index, read_half, observer, downstream, buffer));
        Self {
            index,
            handle,
            outcome: None,
        }
    }

    /// Wait for the pump to finish. Cancel safe; the result is kept.
    async fn wait(&mut self) {
        if self.outcome.is_some() {
            return;
        }
        let result = match (&mut self.handle).await {
            Ok(result) => result,
            Err(e) => Err(ChannelError::Reader {
                index: self.index,
                message: e.to_string(),
            }),
        };
        self.outcome = Some(result);
    }

    async fn join(mut self) -> ReaderResult {
        self.wait().await;
        self.outcome.take().unwrap_or_else(|| {
            Err(ChannelError::Reader {
                index: self.index,
                message: "reader result already taken".to_string(),
            })
        })
    }
}

impl Drop for ReaderTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn pump_output(
    index: usize,
    read_half: OwnedReadHalf,
    observer: Arc<dyn ChainObserver>,
    downstream: Option<mpsc::Sender<Bytes>>,
    buffer: bool,
) -> ReaderResult {
    let mut reader = FramedRead::new(read_half, DigitStreamCodec::new());
    let mut buffered = buffer.then(BytesMut::new);

    while let Some(chunk) = reader.next().await {
        let chunk = chunk.map_err(|source| ChannelError::Protocol { index, source })?;
        tracing::trace!(index, len = chunk.len(), "Worker output");

        observer.on_data(index, &chunk);
        if let Some(buf) = buffered.as_mut() {
            buf.extend_from_slice(&chunk);
        }
        if let Some(tx) = &downstream
            && tx.send(chunk).await.is_err()
        {
            return Err(ChannelError::DownstreamClosed { index });
        }
    }

    tracing::debug!(index, "Worker closed its stream");
    Ok(ReaderOutput {
        bytes: reader.decoder().decoded_bytes(),
        buffered,
    })
}

struct Connection {
    child: Child,
    writer: OwnedWriteHalf,
    reader: ReaderTask,
}

enum State {
    Idle,
    Connecting,
    Connected(Connection),
    Closing { child: Child },
    Closed,
}

impl State {
    fn kind(&self) -> ChannelState {
        match self {
            Self::Idle => ChannelState::Idle,
            Self::Connecting => ChannelState::Connecting,
            Self::Connected(_) => ChannelState::Connected,
            Self::Closing { .. } => ChannelState::Closing,
            Self::Closed => ChannelState::Closed,
        }
    }
}

/// Orchestrator-side handle to one worker process.
///
/// Spawning is a side effect of the first [`write`](Self::write). Output is
/// delivered to the observer and, if set, to the downstream queue feeding
/// the next channel.
pub struct WorkerChannel {
    config: ChannelConfig,
    spawner: Arc<dyn WorkerSpawner>,
    observer: Arc<dyn ChainObserver>,
    downstream: Option<mpsc::Sender<Bytes>>,
    state: State,
    spawns: usize,
    bytes_in: u64,
}

impl WorkerChannel {
    pub fn new(
        config: ChannelConfig,
        spawner: Arc<dyn WorkerSpawner>,
        observer: Arc<dyn ChainObserver>,
        downstream: Option<mpsc::Sender<Bytes>>,
    ) -> Self {
        Self {
            config,
            spawner,
            observer,
            downstream,
            state: State::Idle,
            spawns: 0,
            bytes_in: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.config.index
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn state(&self) -> ChannelState {
        self.state.kind()
    }

    /// Number of worker processes this channel has started.
    pub fn spawns(&self) -> usize {
        self.spawns
    }

    /// Send bytes to the worker, spawning and connecting it on first use.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        match self.state.kind() {
            ChannelState::Idle => self.connect().await?,
            ChannelState::Connected => {}
            state => return Err(self.invalid(state, "write")),
        }

        let index = self.config.index;
        let State::Connected(conn) = &mut self.state else {
            return Err(ChannelError::InvalidState {
                index,
                state: ChannelState::Connecting,
                operation: "write",
            });
        };
        conn.writer
            .write_all(bytes)
            .await
            .map_err(|source| ChannelError::Write { index, source })?;
        self.bytes_in += bytes.len() as u64;
        Ok(())
    }

    /// Resolve once the worker has closed its output stream, returning
    /// whether the stream ended cleanly with the end marker.
    ///
    /// Pending forever if the channel is not connected. Cancel safe.
    pub async fn closed(&mut self) -> bool {
        match &mut self.state {
            State::Connected(conn) => {
                conn.reader.wait().await;
                matches!(conn.reader.outcome, Some(Ok(_)))
            }
            _ => std::future::pending().await,
        }
    }

    /// Wait for the worker to finish its stream, stop the process, and report
    /// what passed through. Emits `on_complete` and releases the downstream
    /// queue on success.
    pub async fn finish(&mut self) -> Result<ChannelOutput, ChannelError> {
        let index = self.config.index;
        let state = self.state.kind();
        if state != ChannelState::Connected {
            return Err(self.invalid(state, "finish"));
        }
        // Stays Connected until the worker has ended its output.
        if let State::Connected(conn) = &mut self.state {
            conn.reader.wait().await;
        }

        let State::Connected(Connection {
            child,
            writer,
            reader,
        }) = std::mem::replace(&mut self.state, State::Closed)
        else {
            return Err(self.invalid(ChannelState::Closed, "finish"));
        };

        self.state = State::Closing { child };
        tracing::debug!(index, "Channel closing");

        let result = reader.join().await;
        drop(writer);

        if let State::Closing { child } = std::mem::replace(&mut self.state, State::Closed) {
            self.stop_child(child).await?;
        }
        let output = result?;

        tracing::debug!(index, bytes_out = output.bytes, "Channel closed");
        self.observer.on_complete(index);
        self.downstream = None;

        let buffered = output.buffered.map(|mut buf| {
            if buf.last() == Some(&END_MARKER) {
                buf.truncate(buf.len() - 1);
            }
            buf.freeze()
        });

        Ok(ChannelOutput {
            index,
            bytes_in: self.bytes_in,
            bytes_out: output.bytes,
            buffered,
        })
    }

    async fn connect(&mut self) -> Result<(), ChannelError> {
        self.state = State::Connecting;
        match self.open().await {
            Ok(conn) => {
                self.state = State::Connected(conn);
                tracing::debug!(index = self.config.index, port = self.config.port, "Channel connected");
                Ok(())
            }
            Err(e) => {
                self.state = State::Closed;
                Err(e)
            }
        }
    }

    async fn open(&mut self) -> Result<Connection, ChannelError> {
        let index = self.config.index;
        let port = self.config.port;

        let mut child = self
            .spawner
            .spawn(&WorkerSpawnConfig { index, port })
            .map_err(|source| ChannelError::Spawn { index, source })?;
        self.spawns += 1;
        tracing::debug!(index, port, pid = ?child.id(), "Worker spawned");

        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let connected = tokio::select! {
            result = connect_with_retry(addr, self.config.connect_timeout, self.config.connect_interval) => {
                result.map_err(|source| ChannelError::ConnectTimeout { index, source })
            }
            status = child.wait() => match status {
                Ok(status) => Err(ChannelError::WorkerExited { index, status }),
                Err(source) => Err(ChannelError::Reap { index, source }),
            },
        };

        let stream = match connected {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(index, port, error = %e, "Worker failed to become reachable");
                if let Err(kill_err) = child.kill().await {
                    tracing::warn!(index, error = %kill_err, "Failed to kill unreachable worker");
                }
                return Err(e);
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(index, error = %e, "Failed to set TCP_NODELAY");
        }

        let (read_half, writer) = stream.into_split();
        let reader = ReaderTask::spawn(
            index,
            read_half,
            Arc::clone(&self.observer),
            self.downstream.clone(),
            self.config.buffer_output,
        );

        Ok(Connection {
            child,
            writer,
            reader,
        })
    }

    /// Ask the worker to terminate, escalating to a kill after the grace period.
    async fn stop_child(&self, mut child: Child) -> Result<(), ChannelError> {
        let index = self.config.index;
        let reap = |source| ChannelError::Reap { index, source };

        if let Some(status) = child.try_wait().map_err(reap)? {
            tracing::debug!(index, %status, "Worker already exited");
            return Ok(());
        }

        if let Err(e) = request_terminate(&mut child) {
            tracing::warn!(index, error = %e, "Failed to signal worker");
        }

        match tokio::time::timeout(self.config.shutdown_grace, child.wait()).await {
            Ok(status) => {
                let status = status.map_err(reap)?;
                tracing::debug!(index, %status, "Worker reaped");
            }
            Err(_) => {
                tracing::warn!(index, grace = ?self.config.shutdown_grace, "Worker ignored termination, killing");
                child.kill().await.map_err(reap)?;
            }
        }
        Ok(())
    }

    fn invalid(&self, state: ChannelState, operation: &'static str) -> ChannelError {
        ChannelError::InvalidState {
            index: self.config.index,
            state,
            operation,
        }
    }
}

impl Drop for WorkerChannel {
    fn drop(&mut self) {
        let child = match &mut self.state {
            State::Connected(conn) => &mut conn.child,
            State::Closing { child } => child,
            _ => return,
        };
        if let Err(e) = child.start_kill() {
            tracing::trace!(index = self.config.index, error = %e, "Worker already gone on drop");
        }
    }
}

#[cfg(unix)]
fn request_terminate(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    match child.id() {
        Some(pid) => kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(io::Error::from),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn request_terminate(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-process stand-ins for worker processes.

    use std::process::Stdio;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::process::Command;

    use super::*;
    use crate::worker::serve_one;

    /// Serves the worker pipeline on a task in this process and returns a
    /// placeholder `sleep` child for the channel to own and reap.
    #[derive(Default)]
    pub struct InProcessSpawner {
        pub spawned: AtomicUsize,
    }

    impl InProcessSpawner {
        pub fn count(&self) -> usize {
            self.spawned.load(Ordering::SeqCst)
        }
    }

    impl WorkerSpawner for InProcessSpawner {
        fn spawn(&self, config: &WorkerSpawnConfig) -> Result<Child, SpawnError> {
            tokio::spawn(serve_one(bind(config.port)?));

            self.spawned.fetch_add(1, Ordering::SeqCst);
            placeholder_child()
        }
    }

    /// What a faulty worker does once it has read its whole input.
    #[derive(Debug, Clone, Copy)]
    pub enum Fault {
        /// Send part of an answer, then close without the end marker.
        HangUp,
        /// Send these bytes instead of the answer.
        Reply(&'static [u8]),
    }

    /// Serves the real pipeline everywhere except at `index`, where the
    /// worker misbehaves.
    pub struct FaultySpawner {
        index: usize,
        fault: Fault,
        healthy: InProcessSpawner,
    }

    impl FaultySpawner {
        pub fn new(index: usize, fault: Fault) -> Self {
            Self {
                index,
                fault,
                healthy: InProcessSpawner::default(),
            }
        }
    }

    impl WorkerSpawner for FaultySpawner {
        fn spawn(&self, config: &WorkerSpawnConfig) -> Result<Child, SpawnError> {
            if config.index != self.index {
                return self.healthy.spawn(config);
            }
            tokio::spawn(serve_faulty(bind(config.port)?, self.fault));
            placeholder_child()
        }
    }

    async fn serve_faulty(listener: tokio::net::TcpListener, fault: Fault) -> io::Result<()> {
        use tokio::io::AsyncReadExt;

        let (mut stream, _) = listener.accept().await?;
        let mut input = Vec::new();
        let mut buf = [0u8; 256];
        while !input.contains(&END_MARKER) {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            input.extend_from_slice(&buf[..n]);
        }

        match fault {
            Fault::HangUp => stream.write_all(b"12").await?,
            Fault::Reply(bytes) => stream.write_all(bytes).await?,
        }
        stream.shutdown().await
    }

    fn bind(port: u16) -> Result<tokio::net::TcpListener, SpawnError> {
        let listener = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, port))
            .map_err(|e| SpawnError::Other(e.to_string()))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| SpawnError::Other(e.to_string()))?;
        tokio::net::TcpListener::from_std(listener).map_err(|e| SpawnError::Other(e.to_string()))
    }

    /// Spawns a child that never listens.
    pub struct SilentSpawner;

    impl WorkerSpawner for SilentSpawner {
        fn spawn(&self, _config: &WorkerSpawnConfig) -> Result<Child, SpawnError> {
            placeholder_child()
        }
    }

    pub fn placeholder_child() -> Result<Child, SpawnError> {
        Command::new("sleep")
            .arg("30")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SpawnError::Spawn {
                program: "sleep".into(),
                source,
            })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::Mutex;

    use super::testing::{InProcessSpawner, SilentSpawner};
    use super::*;
    use crate::observer::NoopObserver;

    #[derive(Default)]
    struct Recorder {
        data: Mutex<Vec<u8>>,
        completed: Mutex<Vec<usize>>,
    }

    impl ChainObserver for Recorder {
        fn on_data(&self, _index: usize, chunk: &Bytes) {
            self.data.lock().unwrap().extend_from_slice(chunk);
        }

        fn on_complete(&self, index: usize) {
            self.completed.lock().unwrap().push(index);
        }
    }

    #[tokio::test]
    async fn connect_retry_times_out_without_listener() {
        let addr: SocketAddr = "127.0.0.1:27301".parse().unwrap();
        let started = Instant::now();

        let err = connect_with_retry(addr, Duration::from_millis(200), Duration::from_millis(10))
            .await
            .unwrap_err();

        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(err.attempts > 1);
        assert_eq!(err.addr, addr);
    }

    #[tokio::test]
    async fn connect_retry_succeeds_when_listener_appears() {
        let addr: SocketAddr = "127.0.0.1:27302".parse().unwrap();

        let late_listener = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
            listener.accept().await.unwrap();
        });

        let stream = connect_with_retry(addr, Duration::from_secs(1), Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(stream.peer_addr().unwrap(), addr);
        late_listener.await.unwrap();
    }

    #[tokio::test]
    async fn first_write_spawns_once_and_reuses_connection() {
        let spawner = Arc::new(InProcessSpawner::default());
        let recorder = Arc::new(Recorder::default());
        let mut channel = WorkerChannel::new(
            ChannelConfig::new(0, 27310).with_buffer_output(true),
            spawner.clone(),
            recorder.clone(),
            None,
        );
        assert_eq!(channel.state(), ChannelState::Idle);

        channel.write(b"12").await.unwrap();
        assert_eq!(channel.state(), ChannelState::Connected);
        assert_eq!(spawner.count(), 1);

        channel.write(b"11\n").await.unwrap();
        assert_eq!(spawner.count(), 1);
        assert_eq!(channel.spawns(), 1);

        let output = channel.finish().await.unwrap();
        assert_eq!(channel.state(), ChannelState::Closed);
        assert_eq!(output.buffered.as_deref(), Some(&b"111221"[..]));
        assert_eq!(output.bytes_in, 5);
        assert_eq!(output.bytes_out, 7);
        assert_eq!(recorder.data.lock().unwrap().as_slice(), b"111221\n");
        assert_eq!(*recorder.completed.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn output_is_forwarded_downstream() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut channel = WorkerChannel::new(
            ChannelConfig::new(1, 27320),
            Arc::new(InProcessSpawner::default()),
            Arc::new(NoopObserver),
            Some(tx),
        );

        channel.write(b"1\n").await.unwrap();
        let output = channel.finish().await.unwrap();
        assert!(output.buffered.is_none());
        drop(channel);

        let mut forwarded = Vec::new();
        while let Some(chunk) = rx.recv().await {
            forwarded.extend_from_slice(&chunk);
        }
        assert_eq!(forwarded, b"11\n");
    }

    #[tokio::test]
    async fn unreachable_worker_fails_and_closes() {
        let mut channel = WorkerChannel::new(
            ChannelConfig::new(2, 27330).with_connect_timeout(Duration::from_millis(100)),
            Arc::new(SilentSpawner),
            Arc::new(NoopObserver),
            None,
        );

        let err = channel.write(b"1\n").await.unwrap_err();
        assert!(matches!(err, ChannelError::ConnectTimeout { index: 2, .. }));
        assert_eq!(channel.state(), ChannelState::Closed);

        let err = channel.write(b"1\n").await.unwrap_err();
        assert!(matches!(
            err,
            ChannelError::InvalidState {
                state: ChannelState::Closed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn finish_before_write_is_invalid() {
        let mut channel = WorkerChannel::new(
            ChannelConfig::new(0, 27340),
            Arc::new(SilentSpawner),
            Arc::new(NoopObserver),
            None,
        );
        let err = channel.finish().await.unwrap_err();
        assert!(matches!(
            err,
            ChannelError::InvalidState {
                state: ChannelState::Idle,
                operation: "finish",
                ..
            }
        ));
        assert_eq!(channel.state(), ChannelState::Idle);
    }

    #[test]
    fn state_names() {
        assert_eq!(ChannelState::Connecting.to_string(), "connecting");
        assert_eq!(ChannelState::Closed.as_str(), "closed");
    }

    #[tokio::test]
    async fn stays_connected_until_worker_ends_output() {
        let mut channel = WorkerChannel::new(
            ChannelConfig::new(0, 27350).with_buffer_output(true),
            Arc::new(InProcessSpawner::default()),
            Arc::new(NoopObserver),
            None,
        );

        channel.write(b"12").await.unwrap();
        let pending = tokio::time::timeout(Duration::from_millis(100), channel.finish()).await;
        assert!(pending.is_err());
        assert_eq!(channel.state(), ChannelState::Connected);

        channel.write(b"\n").await.unwrap();
        let output = channel.finish().await.unwrap();
        assert_eq!(output.buffered.as_deref(), Some(&b"1112"[..]));
        assert_eq!(channel.state(), ChannelState::Closed);
    }

    #[test]
    fn error_chain_names_each_cause_once() {
        let err = ChannelError::Spawn {
            index: 0,
            source: SpawnError::Spawn {
                program: "/nonexistent/saychain-worker".into(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
            },
        };
        assert_eq!(
            format!("{:#}", anyhow::Error::new(err)),
            "channel 0: worker spawn failed: failed to spawn /nonexistent/saychain-worker: no such file"
        );

        let err = ChannelError::Protocol {
            index: 2,
            source: ProtocolError::InvalidByte { byte: b'x' },
        };
        assert_eq!(
            format!("{:#}", anyhow::Error::new(err)),
            "channel 2: bad worker output: invalid byte 0x78 in digit stream"
        );
    }
}
