//! Wire types for the digit stream exchanged between a channel and its worker.
//!
//! A stream is ASCII digits followed by exactly one [`END_MARKER`]. There is no
//! length prefix; a reader knows the stream is complete only when it sees the
//! marker.

use std::fmt;
use std::io;

/// Terminates every digit stream.
pub const END_MARKER: u8 = b'\n';

/// A maximal run of one repeated ASCII digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    digit: u8,
    len: usize,
}

impl Run {
    /// Start a run of length one.
    ///
    /// `digit` is the ASCII byte (`b'0'..=b'9'`), not its numeric value.
    pub fn start(digit: u8) -> Self {
        debug_assert!(digit.is_ascii_digit());
        Self { digit, len: 1 }
    }

    pub fn digit(&self) -> u8 {
        self.digit
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn extend(&mut self) {
        self.len += 1;
    }
}

impl fmt::Display for Run {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.len, self.digit as char)
    }
}

/// Unit emitted by the segmenter and consumed by the run encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Run(Run),
    End,
}

/// Framing violations on a digit stream.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid byte 0x{byte:02x} in digit stream")]
    InvalidByte { byte: u8 },

    #[error("{len} bytes received after end-of-input marker")]
    TrailingData { len: usize },

    #[error("digit stream closed before end-of-input marker")]
    Truncated,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Check that `bytes` is a non-empty run of ASCII digits with no marker.
pub fn validate_digits(bytes: &[u8]) -> Result<(), ProtocolError> {
    if bytes.is_empty() {
        return Err(ProtocolError::Truncated);
    }
    match bytes.iter().find(|b| !b.is_ascii_digit()) {
        Some(&byte) => Err(ProtocolError::InvalidByte { byte }),
        None => Ok(()),
    }
}
