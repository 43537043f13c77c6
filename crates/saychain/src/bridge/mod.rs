//! Wire protocol between a worker channel (parent) and its worker process.
//!
//! # Architecture
//!
//! - **protocol**: Stream units (Run, Segment), the end marker, framing errors
//! - **codec**: Streaming digit decoder for AsyncRead

pub mod codec;
pub mod protocol;
