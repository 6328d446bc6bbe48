//! Consumer side: the handler the audio device calls for every output block.
//!
//! Rules: NO allocs, NO blocking, NO logging. One bounded lock inside the
//! ring buffer and a couple of relaxed atomics are all it touches.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use super::ring_buffer::{ReadStatus, RingBuffer};

/// Counters written by the callback, read by the lifecycle controller.
#[derive(Debug, Default)]
pub struct CallbackStats {
    pub callbacks: AtomicU64,
    pub underruns: AtomicU64,
    pub bytes_played: AtomicU64,
    /// Largest block the device has asked for so far.
    pub max_block: AtomicUsize,
}

/// Handed to an [`AudioSink`](super::sink::AudioSink) when it is armed.
#[derive(Clone)]
pub struct StreamCallback {
    ring: Arc<RingBuffer>,
    stats: Arc<CallbackStats>,
}

impl StreamCallback {
    pub fn new(ring: Arc<RingBuffer>, stats: Arc<CallbackStats>) -> Self {
        Self { ring, stats }
    }

    /// Fill the device buffer completely: buffered bytes if there are enough
    /// for the whole block, silence otherwise.
    #[inline]
    pub fn fill(&mut self, out: &mut [u8]) -> ReadStatus {
        let status = self.ring.try_read_exact(out);
        self.stats.callbacks.fetch_add(1, Ordering::Relaxed);
        self.stats.max_block.fetch_max(out.len(), Ordering::Relaxed);
        match status {
            ReadStatus::Filled => {
                self.stats
                    .bytes_played
                    .fetch_add(out.len() as u64, Ordering::Relaxed);
            }
            ReadStatus::Underrun => {
                self.stats.underruns.fetch_add(1, Ordering::Relaxed);
            }
        }
        status
    }
}
