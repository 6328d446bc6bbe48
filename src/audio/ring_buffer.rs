//! Bounded byte ring buffer shared by the network thread and the audio callback.
//!
//!   - The network thread WRITES whole chunks (producer), waiting for space
//!   - The audio callback READS exact-size blocks (consumer), never waiting
//!   - A read either takes the full request or nothing; an underrun yields silence
//!
//! One mutex guards storage, cursors and the occupancy count. Two condition
//! variables carry the "space available" and "data available" signals. Every
//! critical section is a bounded memcpy plus cursor arithmetic, so the audio
//! callback's worst-case wait on the lock is one such copy.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{StreamError, StreamResult};

/// Value written for silence. Zero for both signed PCM and float samples.
pub const SILENCE: u8 = 0;

/// Outcome of [`RingBuffer::try_read_exact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The whole request was served from buffered data.
    Filled,
    /// Not enough data; the output holds silence and the buffer is untouched.
    Underrun,
}

impl ReadStatus {
    pub fn is_underrun(self) -> bool {
        self == ReadStatus::Underrun
    }
}

struct State {
    /// The byte data. Fixed-size, allocated once.
    storage: Box<[u8]>,
    write_pos: usize,
    read_pos: usize,
    /// Unread bytes. Disambiguates full from empty when the cursors coincide.
    occupied: usize,
    closed: bool,
}

impl State {
    /// Copy `data` in at the write cursor, wrapping at most once.
    fn push(&mut self, data: &[u8]) {
        let capacity = self.storage.len();
        let first = data.len().min(capacity - self.write_pos);
        let (head, tail) = data.split_at(first);
        self.storage[self.write_pos..self.write_pos + first].copy_from_slice(head);
        self.storage[..tail.len()].copy_from_slice(tail);
        self.write_pos = (self.write_pos + data.len()) % capacity;
        self.occupied += data.len();
    }

    /// Copy `out.len()` bytes out from the read cursor, wrapping at most once.
    fn pop(&mut self, out: &mut [u8]) {
        let capacity = self.storage.len();
        let first = out.len().min(capacity - self.read_pos);
        let (head, tail) = out.split_at_mut(first);
        head.copy_from_slice(&self.storage[self.read_pos..self.read_pos + first]);
        tail.copy_from_slice(&self.storage[..tail.len()]);
        self.read_pos = (self.read_pos + out.len()) % capacity;
        self.occupied -= out.len();
    }
}

pub struct RingBuffer {
    state: Mutex<State>,
    /// Signalled by readers after freeing space.
    space_available: Condvar,
    /// Signalled by writers after committing data.
    data_available: Condvar,
    capacity: usize,
}

impl RingBuffer {
    /// Panics on a zero capacity; callers validate the configuration first.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Ring buffer capacity must be non-zero");

        Self {
            state: Mutex::new(State {
                storage: vec![SILENCE; capacity].into_boxed_slice(),
                write_pos: 0,
                read_pos: 0,
                occupied: 0,
                closed: false,
            }),
            space_available: Condvar::new(),
            data_available: Condvar::new(),
            capacity,
        }
    }

    /// Write all of `data`, suspending until enough space is free.
    ///
    /// The chunk is committed as one unit: a reader sees either none of it or
    /// all of it. A chunk larger than the whole buffer can never fit and is
    /// rejected instead of waiting forever.
    pub fn write(&self, data: &[u8]) -> StreamResult<()> {
        if data.len() > self.capacity {
            return Err(StreamError::OversizedWrite {
                len: data.len(),
                capacity: self.capacity,
            });
        }
        if data.is_empty() {
            return Ok(());
        }

        let mut state = self.state.lock();
        while !state.closed && self.capacity - state.occupied < data.len() {
            self.space_available.wait(&mut state);
        }
        if state.closed {
            return Err(StreamError::Closed);
        }

        state.push(data);
        drop(state);

        self.data_available.notify_one();
        Ok(())
    }

    /// Fill `out` completely from the buffer, or with silence if fewer than
    /// `out.len()` bytes are buffered. Never suspends.
    ///
    /// On underrun the cursors and occupancy are left exactly as they were,
    /// so buffered bytes stay aligned to frame boundaries.
    pub fn try_read_exact(&self, out: &mut [u8]) -> ReadStatus {
        let mut state = self.state.lock();
        if state.occupied < out.len() {
            drop(state);
            out.fill(SILENCE);
            return ReadStatus::Underrun;
        }

        state.pop(out);
        drop(state);

        self.space_available.notify_one();
        ReadStatus::Filled
    }

    /// Wait until at least `min` bytes are buffered or `timeout` lapses.
    /// Returns whether the threshold was reached. `min` is clamped to capacity.
    pub fn wait_for_data(&self, min: usize, timeout: Duration) -> bool {
        let min = min.min(self.capacity);
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.occupied < min && !state.closed {
            if self
                .data_available
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                break;
            }
        }
        state.occupied >= min
    }

    /// Reject all further writes, waking a writer waiting for space and any
    /// `wait_for_data` caller. Buffered bytes stay readable.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.space_available.notify_all();
        self.data_available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.state.lock().occupied
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes that can be written without waiting.
    pub fn free(&self) -> usize {
        self.capacity - self.state.lock().occupied
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity)
            .field("occupied", &state.occupied)
            .field("write_pos", &state.write_pos)
            .field("read_pos", &state.read_pos)
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn cursors(rb: &RingBuffer) -> (usize, usize, usize) {
        let state = rb.state.lock();
        (state.write_pos, state.read_pos, state.occupied)
    }

    #[test]
    fn partial_read_then_underrun_then_wrapped_read() {
        let rb = RingBuffer::new(16);

        rb.write(&[0xAA; 10]).unwrap();
        assert_eq!(rb.len(), 10);

        let mut four = [0u8; 4];
        assert_eq!(rb.try_read_exact(&mut four), ReadStatus::Filled);
        assert_eq!(four, [0xAA; 4]);
        assert_eq!(rb.len(), 6);

        let mut eight = [0xFFu8; 8];
        assert_eq!(rb.try_read_exact(&mut eight), ReadStatus::Underrun);
        assert_eq!(eight, [SILENCE; 8]);
        assert_eq!(rb.len(), 6);

        rb.write(&[0xBB; 2]).unwrap();
        assert_eq!(rb.len(), 8);

        let mut eight = [0u8; 8];
        assert_eq!(rb.try_read_exact(&mut eight), ReadStatus::Filled);
        assert_eq!(eight, [0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xBB, 0xBB]);
        assert!(rb.is_empty());
    }

    #[test]
    fn underrun_leaves_cursors_untouched() {
        let rb = RingBuffer::new(8);
        rb.write(&[1, 2, 3]).unwrap();
        let before = cursors(&rb);

        let mut out = [9u8; 4];
        for _ in 0..3 {
            assert!(rb.try_read_exact(&mut out).is_underrun());
            assert_eq!(out, [0; 4]);
            assert_eq!(cursors(&rb), before);
        }

        let mut three = [0u8; 3];
        assert_eq!(rb.try_read_exact(&mut three), ReadStatus::Filled);
        assert_eq!(three, [1, 2, 3]);
    }

    #[test]
    fn write_wraps_across_end_of_storage() {
        let rb = RingBuffer::new(8);
        rb.write(&[0; 6]).unwrap();
        let mut sink = [0u8; 6];
        rb.try_read_exact(&mut sink);

        rb.write(&[1, 2, 3, 4, 5]).unwrap();
        let (write_pos, read_pos, occupied) = cursors(&rb);
        assert_eq!((write_pos, read_pos, occupied), (3, 6, 5));

        let mut out = [0u8; 5];
        assert_eq!(rb.try_read_exact(&mut out), ReadStatus::Filled);
        assert_eq!(out, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn full_buffer_has_equal_cursors() {
        let rb = RingBuffer::new(8);
        rb.write(&[7; 8]).unwrap();
        let (write_pos, read_pos, occupied) = cursors(&rb);
        assert_eq!(write_pos, read_pos);
        assert_eq!(occupied, 8);
        assert_eq!(rb.free(), 0);
    }

    #[test]
    fn oversized_write_is_rejected_not_blocked() {
        let rb = RingBuffer::new(8);
        let err = rb.write(&[0; 9]).unwrap_err();
        assert!(matches!(
            err,
            StreamError::OversizedWrite {
                len: 9,
                capacity: 8
            }
        ));
        assert!(rb.is_empty());
    }

    #[test]
    fn empty_write_and_read_are_no_ops() {
        let rb = RingBuffer::new(4);
        rb.write(&[]).unwrap();
        assert!(rb.is_empty());
        assert_eq!(rb.try_read_exact(&mut []), ReadStatus::Filled);
    }

    #[test]
    fn full_buffer_write_waits_for_reader() {
        let rb = Arc::new(RingBuffer::new(8));
        rb.write(&[1; 8]).unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let writer = {
            let rb = rb.clone();
            let done = done.clone();
            thread::spawn(move || {
                rb.write(&[2]).unwrap();
                done.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!done.load(Ordering::SeqCst), "write must wait while full");
        assert_eq!(rb.len(), 8);

        let mut two = [0u8; 2];
        assert_eq!(rb.try_read_exact(&mut two), ReadStatus::Filled);
        writer.join().unwrap();

        assert!(done.load(Ordering::SeqCst));
        assert_eq!(rb.len(), 7);
    }

    #[test]
    fn close_wakes_waiting_writer() {
        let rb = Arc::new(RingBuffer::new(4));
        rb.write(&[0; 4]).unwrap();

        let writer = {
            let rb = rb.clone();
            thread::spawn(move || rb.write(&[1, 2]))
        };
        thread::sleep(Duration::from_millis(50));
        rb.close();

        assert!(matches!(writer.join().unwrap(), Err(StreamError::Closed)));
        assert!(rb.is_closed());
        // Buffered data stays readable after close.
        let mut out = [9u8; 4];
        assert_eq!(rb.try_read_exact(&mut out), ReadStatus::Filled);
    }

    #[test]
    fn close_ends_wait_for_data_early() {
        let rb = Arc::new(RingBuffer::new(32));
        rb.write(&[1; 4]).unwrap();

        let closer = {
            let rb = rb.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                rb.close();
            })
        };
        let started = Instant::now();
        assert!(!rb.wait_for_data(16, Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_secs(2));
        closer.join().unwrap();
        assert_eq!(rb.len(), 4);
    }

    #[test]
    fn wait_for_data_sees_concurrent_write() {
        let rb = Arc::new(RingBuffer::new(32));
        let writer = {
            let rb = rb.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                rb.write(&[5; 16]).unwrap();
            })
        };

        assert!(rb.wait_for_data(16, Duration::from_secs(5)));
        writer.join().unwrap();
        assert!(!rb.wait_for_data(17, Duration::from_millis(20)));
    }
}
