//! Lifecycle controller: owns the ring buffer, the producer thread and the sink.
//!
//! Start order: buffer → producer → (optional prebuffer) → sink.
//! Stop order:  clear running flag → join producer → deactivate sink → release buffer.
//!
//! The sink stays active while the producer is joined, so a producer waiting
//! for space is always drained and can reach its next flag check.

use crossbeam_channel::{unbounded, Receiver};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::consumer::{CallbackStats, StreamCallback};
use super::producer::{self, ProducerExit, ProducerStats};
use super::ring_buffer::RingBuffer;
use super::sink::AudioSink;
use super::source::ByteSource;
use crate::config::StreamConfig;
use crate::error::StreamResult;

/// Upper bound on the prebuffer wait before the sink is armed anyway.
const PREBUFFER_TIMEOUT: Duration = Duration::from_secs(2);

/// Notifications from the playback threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// The prebuffer wait finished, with `bytes` buffered.
    Prebuffered { bytes: usize, reached: bool },
    ProducerExited(ProducerExit),
}

// ─── Diagnostics ───

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    /// Ring buffer capacity in bytes.
    pub buffer_capacity: usize,
    /// Bytes currently buffered.
    pub buffer_filled: usize,
    /// Buffer fill percentage (0–100).
    pub buffer_fill_pct: f32,
    /// Audio currently buffered, in milliseconds.
    pub latency_ms: f64,
    /// Largest block the output device has requested, in bytes.
    pub device_block_bytes: usize,
    /// Callbacks answered with silence.
    pub underrun_count: u64,
    pub callbacks: u64,
    pub bytes_received: u64,
    pub bytes_played: u64,
}

/// What `stop` leaves behind.
#[derive(Debug, Clone)]
pub struct StopReport {
    pub exit: ProducerExit,
    pub diagnostics: Diagnostics,
}

pub struct Player {
    ring: Arc<RingBuffer>,
    running: Arc<AtomicBool>,
    producer: Option<JoinHandle<ProducerExit>>,
    sink: Box<dyn AudioSink>,
    events: Receiver<PlayerEvent>,
    producer_stats: Arc<ProducerStats>,
    callback_stats: Arc<CallbackStats>,
    bytes_per_second: usize,
    block_bytes: usize,
    report: Option<StopReport>,
}

impl Player {
    /// Validate `config`, then bring up buffer, producer and sink in order.
    ///
    /// If the sink cannot be armed the producer is shut down (the buffer is
    /// closed to release a waiting write) and the error is returned.
    pub fn start(
        config: &StreamConfig,
        source: Box<dyn ByteSource>,
        mut sink: Box<dyn AudioSink>,
    ) -> StreamResult<Self> {
        config.validate()?;

        let ring = Arc::new(RingBuffer::new(config.capacity));
        let running = Arc::new(AtomicBool::new(true));
        let (events_tx, events) = unbounded();
        let producer_stats = Arc::new(ProducerStats::default());
        let callback_stats = Arc::new(CallbackStats::default());

        log::debug!(
            "Ring buffer: {} bytes ({:.0}ms at {}Hz x{} {:?})",
            config.capacity,
            config.capacity as f64 / config.bytes_per_second() as f64 * 1000.0,
            config.sample_rate,
            config.channel_count,
            config.sample_format
        );

        let producer = producer::spawn(
            source,
            ring.clone(),
            running.clone(),
            config.chunk_size,
            producer_stats.clone(),
            events_tx.clone(),
        )?;

        let prebuffer = config.prebuffer_bytes();
        if prebuffer > 0 {
            let reached = ring.wait_for_data(prebuffer, PREBUFFER_TIMEOUT);
            if reached {
                log::info!("Prebuffered {} bytes", ring.len());
            } else {
                log::warn!(
                    "Prebuffer timed out at {}/{} bytes, starting anyway",
                    ring.len(),
                    prebuffer
                );
            }
            let _ = events_tx.send(PlayerEvent::Prebuffered {
                bytes: ring.len(),
                reached,
            });
        }

        let callback = StreamCallback::new(ring.clone(), callback_stats.clone());
        if let Err(e) = sink.activate(callback) {
            log::error!("Failed to start output '{}': {}", sink.name(), e);
            running.store(false, Ordering::SeqCst);
            ring.close();
            let _ = producer.join();
            return Err(e);
        }

        Ok(Self {
            ring,
            running,
            producer: Some(producer),
            sink,
            events,
            producer_stats,
            callback_stats,
            bytes_per_second: config.bytes_per_second(),
            block_bytes: config.callback_bytes(),
            report: None,
        })
    }

    pub fn events(&self) -> &Receiver<PlayerEvent> {
        &self.events
    }

    /// True once the producer has exited and less than one device block
    /// remains buffered; nothing more will ever be played.
    ///
    /// The device may not honour the configured block size, so the largest
    /// block it has actually requested counts too.
    pub fn is_drained(&self) -> bool {
        let producer_done = self
            .producer
            .as_ref()
            .map(|h| h.is_finished())
            .unwrap_or(true);
        producer_done && self.ring.len() < self.device_block_bytes()
    }

    fn device_block_bytes(&self) -> usize {
        self.block_bytes
            .max(self.callback_stats.max_block.load(Ordering::Relaxed))
    }

    /// Returns live buffer and callback counters.
    pub fn diagnostics(&self) -> Diagnostics {
        let filled = self.ring.len();
        let capacity = self.ring.capacity();

        let latency_ms = if self.bytes_per_second > 0 {
            filled as f64 / self.bytes_per_second as f64 * 1000.0
        } else {
            0.0
        };

        Diagnostics {
            buffer_capacity: capacity,
            buffer_filled: filled,
            buffer_fill_pct: (filled as f32 / capacity as f32) * 100.0,
            latency_ms,
            device_block_bytes: self.device_block_bytes(),
            underrun_count: self.callback_stats.underruns.load(Ordering::Relaxed),
            callbacks: self.callback_stats.callbacks.load(Ordering::Relaxed),
            bytes_received: self.producer_stats.bytes_received.load(Ordering::Relaxed),
            bytes_played: self.callback_stats.bytes_played.load(Ordering::Relaxed),
        }
    }

    /// Ordered shutdown. Consumes the player so the buffer is released last.
    pub fn stop(mut self) -> StopReport {
        self.shutdown()
    }

    fn shutdown(&mut self) -> StopReport {
        if let Some(report) = &self.report {
            return report.clone();
        }

        self.running.store(false, Ordering::SeqCst);
        let exit = match self.producer.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| ProducerExit::Failed("producer thread panicked".into())),
            None => ProducerExit::Stopped,
        };

        self.sink.deactivate();

        let diagnostics = self.diagnostics();
        log::info!(
            "Playback stopped ({:?}): {} bytes received, {} callbacks, {} underruns",
            exit,
            diagnostics.bytes_received,
            diagnostics.callbacks,
            diagnostics.underrun_count
        );

        let report = StopReport { exit, diagnostics };
        self.report = Some(report.clone());
        report
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.shutdown();
    }
}
