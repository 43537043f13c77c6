//! Run encoder: `<length><digit>` for each completed run.

use std::fmt::Write as _;
use std::io;

use tokio_util::bytes::BytesMut;
use tokio_util::codec::Encoder;

use crate::bridge::protocol::{END_MARKER, ProtocolError, Run, Segment};
use crate::segment::SegmentBuffer;

/// Append the encoding of one run to `dst`.
pub fn encode_run(run: &Run, dst: &mut BytesMut) -> Result<(), ProtocolError> {
    write!(dst, "{}", run.len()).map_err(|e| io::Error::other(e.to_string()))?;
    dst.extend_from_slice(&[run.digit()]);
    Ok(())
}

/// Codec side of the worker pipeline, for use with `FramedWrite`.
///
/// Runs become `<length><digit>`; the end marker is passed through as-is.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunEncoder;

impl Encoder<Segment> for RunEncoder {
    type Error = ProtocolError;

    fn encode(&mut self, item: Segment, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Segment::Run(run) => encode_run(&run, dst),
            Segment::End => {
                dst.extend_from_slice(&[END_MARKER]);
                Ok(())
            }
        }
    }
}

/// One look-and-say step over a complete digit string, in process.
///
/// `input` carries no end marker and neither does the result.
pub fn look_and_say(input: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut segments = Vec::new();
    let mut buffer = SegmentBuffer::new();
    buffer.push(input, |s| segments.push(s))?;
    buffer.push(&[END_MARKER], |s| segments.push(s))?;

    let mut encoder = RunEncoder;
    let mut out = BytesMut::with_capacity(input.len() * 2);
    for segment in segments {
        encoder.encode(segment, &mut out)?;
    }
    out.truncate(out.len() - 1);
    Ok(out.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(segment: Segment) -> Vec<u8> {
        let mut dst = BytesMut::new();
        RunEncoder.encode(segment, &mut dst).unwrap();
        dst.to_vec()
    }

    #[test]
    fn encodes_length_then_digit() {
        let mut run = Run::start(b'4');
        assert_eq!(encoded(Segment::Run(run)), b"14");
        for _ in 0..11 {
            run.extend();
        }
        assert_eq!(encoded(Segment::Run(run)), b"124");
    }

    #[test]
    fn passes_end_marker_through() {
        assert_eq!(encoded(Segment::End), b"\n");
    }

    #[test]
    fn look_and_say_known_terms() {
        let cases: &[(&[u8], &[u8])] = &[
            (b"1", b"11"),
            (b"11", b"21"),
            (b"21", b"1211"),
            (b"1211", b"111221"),
            (b"111221", b"312211"),
            (b"3333333333", b"103"),
        ];
        for (input, expected) in cases {
            assert_eq!(look_and_say(input).unwrap(), *expected);
        }
    }

    #[test]
    fn look_and_say_rejects_non_digits() {
        assert!(look_and_say(b"12 3").is_err());
    }
}
