//! Streaming decoder for newline-terminated digit streams.
//!
//! Yields whatever validated bytes are buffered instead of waiting for the
//! terminator, so a consumer can start on a stream while the producer is
//! still writing it. Works over any AsyncRead (sockets, pipes).

use tokio_util::bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

use super::protocol::{END_MARKER, ProtocolError};

/// Decoder that splits a digit stream into validated chunks.
///
/// The chunk carrying the end marker includes it as its last byte; nothing
/// may follow it.
#[derive(Debug, Default)]
pub struct DigitStreamCodec {
    terminated: bool,
    decoded_bytes: u64,
}

impl DigitStreamCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the end marker has been decoded.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Total bytes handed out so far, end marker included.
    pub fn decoded_bytes(&self) -> u64 {
        self.decoded_bytes
    }

    fn take(&mut self, src: &mut BytesMut, at: usize) -> Bytes {
        self.decoded_bytes += at as u64;
        src.split_to(at).freeze()
    }
}

impl Decoder for DigitStreamCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        if self.terminated {
            return Err(ProtocolError::TrailingData { len: src.len() });
        }

        for (i, &byte) in src.iter().enumerate() {
            if byte == END_MARKER {
                self.terminated = true;
                return Ok(Some(self.take(src, i + 1)));
            }
            if !byte.is_ascii_digit() {
                return Err(ProtocolError::InvalidByte { byte });
            }
        }

        let len = src.len();
        Ok(Some(self.take(src, len)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(chunk) => Ok(Some(chunk)),
            None if self.terminated => Ok(None),
            None => Err(ProtocolError::Truncated),
        }
    }
}
