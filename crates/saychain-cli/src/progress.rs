//! Per-sequence progress tracking.
//!
//! Counts the digits each stage has produced and logs every completion with
//! an estimate of how large the following terms will be. Look-and-say terms
//! grow by roughly 30% per iteration, so the last completed term is enough to
//! extrapolate the rest of the chain.

use std::sync::Mutex;

use bytes::Bytes;
use saychain::{ChainObserver, END_MARKER};

/// Average growth between successive look-and-say terms.
pub const GROWTH_FACTOR: f64 = 1.3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceProgress {
    pub digits: u64,
    pub complete: bool,
}

pub struct ProgressObserver {
    sequences: Mutex<Vec<SequenceProgress>>,
}

impl ProgressObserver {
    pub fn new(iterations: usize) -> Self {
        Self {
            sequences: Mutex::new(vec![SequenceProgress::default(); iterations]),
        }
    }

    pub fn snapshot(&self) -> Vec<SequenceProgress> {
        self.sequences
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn completed(&self) -> usize {
        self.snapshot().iter().filter(|s| s.complete).count()
    }

    /// Estimated digit count of the last term, extrapolated from the latest
    /// completed one.
    pub fn estimated_final_len(&self) -> Option<u64> {
        let sequences = self.snapshot();
        let (index, last) = sequences
            .iter()
            .enumerate()
            .rev()
            .find(|(_, s)| s.complete)?;
        let remaining = (sequences.len() - 1 - index) as i32;
        Some((last.digits as f64 * GROWTH_FACTOR.powi(remaining)).ceil() as u64)
    }
}

impl ChainObserver for ProgressObserver {
    fn on_data(&self, index: usize, chunk: &Bytes) {
        let digits = chunk.iter().filter(|&&b| b != END_MARKER).count() as u64;
        if let Ok(mut sequences) = self.sequences.lock()
            && let Some(sequence) = sequences.get_mut(index)
        {
            sequence.digits += digits;
        }
    }

    fn on_complete(&self, index: usize) {
        let digits = {
            let Ok(mut sequences) = self.sequences.lock() else {
                return;
            };
            let Some(sequence) = sequences.get_mut(index) else {
                return;
            };
            sequence.complete = true;
            sequence.digits
        };

        tracing::info!(
            sequence = index + 1,
            digits,
            estimated_final = self.estimated_final_len(),
            "Sequence complete"
        );
    }
}
