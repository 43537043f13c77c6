//! Chain event delivery.
//!
//! Observers are registered when the chain is built and called from the
//! orchestrator's event loop. The loop is single-threaded, so calls never
//! overlap. Per channel, every `on_data` precedes its `on_complete`, chunks
//! arrive in the order the worker produced them, and `on_complete(i)` always
//! fires before `on_complete(i + 1)`.

use tokio_util::bytes::Bytes;

pub trait ChainObserver: Send + Sync {
    /// A chunk of output arrived from the worker at `index`.
    ///
    /// The final chunk of each stream ends with the end marker.
    fn on_data(&self, index: usize, chunk: &Bytes) {
        let _ = (index, chunk);
    }

    /// The worker at `index` closed its stream and was reaped.
    fn on_complete(&self, index: usize) {
        let _ = index;
    }
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ChainObserver for NoopObserver {}
