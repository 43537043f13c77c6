//! Run segmentation over a chunked digit stream.
//!
//! A run is only known to be complete once a different digit (or the end
//! marker) shows up, so the buffer holds the trailing run of each chunk until
//! the next chunk decides it.

use crate::bridge::protocol::{END_MARKER, ProtocolError, Run, Segment};

/// Scanner that turns arbitrary chunks of a digit stream into maximal runs.
#[derive(Debug, Default)]
pub struct SegmentBuffer {
    partial: Option<Run>,
    finished: bool,
}

impl SegmentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the end marker has been consumed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The run being accumulated, if any.
    pub fn partial(&self) -> Option<&Run> {
        self.partial.as_ref()
    }

    /// Scan one chunk, emitting every run that the chunk completes.
    ///
    /// On the end marker the held run is flushed, [`Segment::End`] is emitted
    /// and scanning stops. Returns whether the stream has finished. Bytes
    /// after the marker and non-digit bytes are protocol errors; segments
    /// emitted before the offending byte stay emitted.
    pub fn push(
        &mut self,
        chunk: &[u8],
        mut emit: impl FnMut(Segment),
    ) -> Result<bool, ProtocolError> {
        for (i, &byte) in chunk.iter().enumerate() {
            if self.finished {
                return Err(ProtocolError::TrailingData {
                    len: chunk.len() - i,
                });
            }

            if byte == END_MARKER {
                if let Some(run) = self.partial.take() {
                    emit(Segment::Run(run));
                }
                emit(Segment::End);
                self.finished = true;
                continue;
            }

            if !byte.is_ascii_digit() {
                return Err(ProtocolError::InvalidByte { byte });
            }

            if let Some(run) = self.partial.as_mut()
                && run.digit() == byte
            {
                run.extend();
                continue;
            }

            if let Some(run) = self.partial.replace(Run::start(byte)) {
                emit(Segment::Run(run));
            }
        }

        Ok(self.finished)
    }
}
