//! Worker process side of a chain link.
//!
//! The parent side (spawning, connecting, forwarding output) is in channel.rs.
//!
//! A worker binds one port, accepts exactly one connection, and answers the
//! digit stream it receives with the next look-and-say term over the same
//! socket:
//!
//! ```text
//!   socket read ──▶ DigitStreamCodec ──▶ SegmentBuffer ──▶ RunEncoder ──▶ socket write
//! ```
//!
//! Output is flushed after every inbound chunk, so the parent sees completed
//! runs while the rest of the stream is still arriving.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::bridge::codec::DigitStreamCodec;
use crate::bridge::protocol::{ProtocolError, Segment};
use crate::encoder::RunEncoder;
use crate::segment::SegmentBuffer;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub host: IpAddr,
    pub port: u16,
}

impl WorkerConfig {
    pub fn new(port: u16) -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("failed to bind {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to accept connection")]
    Accept(#[source] io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Counters for one served stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub bytes_in: u64,
    pub runs: u64,
}

/// Bind the configured port and serve exactly one connection.
pub async fn run_worker(config: WorkerConfig) -> Result<WorkerSummary, WorkerError> {
    let addr = config.addr();
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| WorkerError::Bind { addr, source })?;
    tracing::debug!(%addr, "Worker listening");
    serve_one(listener).await
}

/// Accept a single connection from `listener`, then stop listening and serve it.
pub async fn serve_one(listener: TcpListener) -> Result<WorkerSummary, WorkerError> {
    let (stream, peer) = listener.accept().await.map_err(WorkerError::Accept)?;
    drop(listener);
    tracing::debug!(%peer, "Worker accepted connection");

    let summary = serve_connection(stream).await?;
    tracing::info!(bytes_in = summary.bytes_in, runs = summary.runs, "Worker finished");
    Ok(summary)
}

/// Run one digit stream through the segmenter and encoder, writing results
/// back on the same stream. Returns once the end marker has been echoed and
/// the write side shut down.
pub async fn serve_connection<S>(stream: S) -> Result<WorkerSummary, ProtocolError>
where
    S: AsyncRead + AsyncWrite,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = FramedRead::new(read_half, DigitStreamCodec::new());
    let mut writer = FramedWrite::new(write_half, RunEncoder);

    let mut segments = SegmentBuffer::new();
    let mut pending: Vec<Segment> = Vec::new();
    let mut summary = WorkerSummary::default();

    while let Some(chunk) = reader.next().await {
        let chunk = chunk?;
        summary.bytes_in += chunk.len() as u64;

        segments.push(&chunk, |segment| pending.push(segment))?;
        for segment in pending.drain(..) {
            if matches!(segment, Segment::Run(_)) {
                summary.runs += 1;
            }
            writer.feed(segment).await?;
        }
        writer.flush().await?;

        if segments.is_finished() {
            break;
        }
    }

    if !segments.is_finished() {
        return Err(ProtocolError::Truncated);
    }

    writer.close().await?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn answers_with_next_term() {
        let (mut parent, child) = tokio::io::duplex(64);
        let worker = tokio::spawn(serve_connection(child));

        parent.write_all(b"1211\n").await.unwrap();
        let mut out = Vec::new();
        parent.read_to_end(&mut out).await.unwrap();

        assert_eq!(out, b"111221\n");
        let summary = worker.await.unwrap().unwrap();
        assert_eq!(summary, WorkerSummary { bytes_in: 5, runs: 3 });
    }

    #[tokio::test]
    async fn streams_completed_runs_before_end_marker() {
        let (mut parent, child) = tokio::io::duplex(64);
        let worker = tokio::spawn(serve_connection(child));

        parent.write_all(b"1122").await.unwrap();
        let mut buf = [0u8; 16];
        let n = parent.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"21");

        parent.write_all(b"2\n").await.unwrap();
        let mut rest = Vec::new();
        parent.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"32\n");

        worker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn closed_before_marker_is_truncated() {
        let (mut parent, child) = tokio::io::duplex(64);
        let worker = tokio::spawn(serve_connection(child));

        parent.write_all(b"11").await.unwrap();
        parent.shutdown().await.unwrap();

        let err = worker.await.unwrap().unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated));
    }

    #[tokio::test]
    async fn non_digit_is_protocol_error() {
        let (mut parent, child) = tokio::io::duplex(64);
        let worker = tokio::spawn(serve_connection(child));

        parent.write_all(b"12z\n").await.unwrap();

        let err = worker.await.unwrap().unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidByte { byte: b'z' }));
    }

    #[tokio::test]
    async fn serves_one_tcp_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let worker = tokio::spawn(serve_one(listener));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"21\n").await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"1211\n");

        worker.await.unwrap().unwrap();
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }
}
