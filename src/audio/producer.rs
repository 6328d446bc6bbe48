//! Producer loop: byte source → ring buffer, on its own thread.
//!
//! The running flag is checked once per iteration. A receive or write that is
//! already in progress is never interrupted; it finishes (or keeps waiting)
//! on its own terms, and the loop exits at the next iteration boundary.

use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::player::PlayerEvent;
use super::ring_buffer::RingBuffer;
use super::source::{ByteSource, Received};
use crate::error::{StreamError, StreamResult};

/// Why the producer loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProducerExit {
    /// The running flag was cleared.
    Stopped,
    /// The source closed the stream.
    EndOfStream,
    /// The source or the buffer failed; not retried.
    Failed(String),
}

/// Counters updated by the producer, readable from any thread.
#[derive(Debug, Default)]
pub struct ProducerStats {
    pub bytes_received: AtomicU64,
    pub chunks: AtomicU64,
}

/// Start the producer on a dedicated `network` thread.
///
/// The ring is closed when the loop ends, whatever the reason. Buffered bytes
/// stay readable.
///
/// `chunk_size` bounds every receive and therefore every write; it must not
/// exceed the buffer capacity.
pub fn spawn(
    mut source: Box<dyn ByteSource>,
    ring: Arc<RingBuffer>,
    running: Arc<AtomicBool>,
    chunk_size: usize,
    stats: Arc<ProducerStats>,
    events: Sender<PlayerEvent>,
) -> StreamResult<JoinHandle<ProducerExit>> {
    if chunk_size == 0 || chunk_size > ring.capacity() {
        return Err(StreamError::InvalidConfig(format!(
            "chunk_size {} must be between 1 and the ring buffer capacity {}",
            chunk_size,
            ring.capacity()
        )));
    }

    let handle = thread::Builder::new()
        .name("network".into())
        .spawn(move || {
            log::info!("Producer started, reading from {}", source.describe());
            let exit = run(source.as_mut(), &ring, &running, chunk_size, &stats);
            // Nothing more will be written; wakes a pending prebuffer wait.
            ring.close();
            match &exit {
                ProducerExit::Stopped => log::info!("Producer stopped"),
                ProducerExit::EndOfStream => log::info!(
                    "Stream ended after {} bytes",
                    stats.bytes_received.load(Ordering::Relaxed)
                ),
                ProducerExit::Failed(reason) => log::error!("Producer failed: {}", reason),
            }
            let _ = events.send(PlayerEvent::ProducerExited(exit.clone()));
            exit
        })?;

    Ok(handle)
}

/// The loop body, separated from thread setup so it can be driven inline.
pub fn run(
    source: &mut dyn ByteSource,
    ring: &RingBuffer,
    running: &AtomicBool,
    chunk_size: usize,
    stats: &ProducerStats,
) -> ProducerExit {
    let mut chunk = vec![0u8; chunk_size];

    while running.load(Ordering::SeqCst) {
        let n = match source.receive(&mut chunk) {
            Ok(Received::Data(n)) => n,
            Ok(Received::Idle) => continue,
            Ok(Received::Closed) => return ProducerExit::EndOfStream,
            Err(e) => return ProducerExit::Failed(e.to_string()),
        };

        // Backpressure: waits here while the buffer lacks room for the chunk.
        if let Err(e) = ring.write(&chunk[..n]) {
            return ProducerExit::Failed(e.to_string());
        }
        stats.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
        stats.chunks.fetch_add(1, Ordering::Relaxed);
    }

    ProducerExit::Stopped
}
