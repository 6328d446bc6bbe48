//! Byte sources feeding the producer loop.
//!
//! The producer only ever asks a source for "up to N bytes". Framing, protocol
//! and reconnection are the source's business, not the player's.

use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::io::{ErrorKind, Read};
use std::time::Duration;

use crate::error::{StreamError, StreamResult};

/// Result of a single receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// `n` bytes were written to the front of the buffer.
    Data(usize),
    /// Nothing arrived within the source's poll interval.
    Idle,
    /// Orderly end of stream.
    Closed,
}

/// Blocking supplier of raw stream bytes.
pub trait ByteSource: Send {
    /// Fill at most `buf.len()` bytes. May block up to the source's own timeout.
    fn receive(&mut self, buf: &mut [u8]) -> StreamResult<Received>;

    /// Short description for log lines.
    fn describe(&self) -> String {
        "byte source".into()
    }
}

/// Adapts any `Read` (socket, file, pipe) into a [`ByteSource`].
///
/// Read timeouts surface as [`Received::Idle`], which lets the producer
/// notice a shutdown request between reads.
pub struct ReadSource<R> {
    reader: R,
    label: String,
}

impl<R: Read + Send> ReadSource<R> {
    pub fn new(reader: R, label: impl Into<String>) -> Self {
        Self {
            reader,
            label: label.into(),
        }
    }
}

impl<R: Read + Send> ByteSource for ReadSource<R> {
    fn receive(&mut self, buf: &mut [u8]) -> StreamResult<Received> {
        loop {
            match self.reader.read(buf) {
                Ok(0) => return Ok(Received::Closed),
                Ok(n) => return Ok(Received::Data(n)),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(Received::Idle);
                }
                Err(e) => {
                    return Err(StreamError::connection(
                        format!("read from {}", self.label),
                        e,
                    ));
                }
            }
        }
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

/// Byte source fed by another thread through a crossbeam channel.
///
/// A message longer than the receive buffer is handed out over several
/// receives. The sender hanging up ends the stream.
pub struct ChannelSource {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    offset: usize,
    poll: Duration,
}

impl ChannelSource {
    pub fn new(rx: Receiver<Vec<u8>>, poll: Duration) -> Self {
        Self {
            rx,
            pending: Vec::new(),
            offset: 0,
            poll,
        }
    }
}

impl ByteSource for ChannelSource {
    fn receive(&mut self, buf: &mut [u8]) -> StreamResult<Received> {
        if self.offset >= self.pending.len() {
            match self.rx.recv_timeout(self.poll) {
                Ok(chunk) => {
                    self.pending = chunk;
                    self.offset = 0;
                }
                Err(RecvTimeoutError::Timeout) => return Ok(Received::Idle),
                Err(RecvTimeoutError::Disconnected) => return Ok(Received::Closed),
            }
            if self.pending.is_empty() {
                return Ok(Received::Idle);
            }
        }

        let rest = &self.pending[self.offset..];
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.offset += n;
        Ok(Received::Data(n))
    }

    fn describe(&self) -> String {
        "channel".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::io::{self, Cursor};

    struct TimeoutThenData {
        calls: usize,
    }

    impl Read for TimeoutThenData {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.calls += 1;
            match self.calls {
                1 => Err(io::Error::new(ErrorKind::WouldBlock, "timed out")),
                2 => Err(io::Error::new(ErrorKind::Interrupted, "signal")),
                3 => {
                    buf[0] = 42;
                    Ok(1)
                }
                _ => Err(io::Error::new(ErrorKind::ConnectionReset, "reset")),
            }
        }
    }

    #[test]
    fn read_source_delivers_then_closes() {
        let mut source = ReadSource::new(Cursor::new(vec![1u8, 2, 3, 4, 5]), "cursor");
        let mut buf = [0u8; 3];

        assert_eq!(source.receive(&mut buf).unwrap(), Received::Data(3));
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(source.receive(&mut buf).unwrap(), Received::Data(2));
        assert_eq!(&buf[..2], &[4, 5]);
        assert_eq!(source.receive(&mut buf).unwrap(), Received::Closed);
    }

    #[test]
    fn read_source_maps_timeouts_and_errors() {
        let mut source = ReadSource::new(TimeoutThenData { calls: 0 }, "flaky");
        let mut buf = [0u8; 4];

        assert_eq!(source.receive(&mut buf).unwrap(), Received::Idle);
        // Interrupted is retried inside a single receive.
        assert_eq!(source.receive(&mut buf).unwrap(), Received::Data(1));
        assert_eq!(buf[0], 42);
        let err = source.receive(&mut buf).unwrap_err();
        assert!(err.to_string().contains("flaky"));
    }

    #[test]
    fn channel_source_splits_long_messages() {
        let (tx, rx) = unbounded();
        let mut source = ChannelSource::new(rx, Duration::from_millis(10));
        tx.send(vec![1, 2, 3, 4, 5]).unwrap();
        tx.send(vec![6]).unwrap();
        drop(tx);

        let mut buf = [0u8; 2];
        let mut seen = Vec::new();
        loop {
            match source.receive(&mut buf).unwrap() {
                Received::Data(n) => seen.extend_from_slice(&buf[..n]),
                Received::Idle => continue,
                Received::Closed => break,
            }
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn channel_source_idles_while_sender_is_quiet() {
        let (tx, rx) = unbounded::<Vec<u8>>();
        let mut source = ChannelSource::new(rx, Duration::from_millis(5));
        let mut buf = [0u8; 8];
        assert_eq!(source.receive(&mut buf).unwrap(), Received::Idle);
        tx.send(Vec::new()).unwrap();
        assert_eq!(source.receive(&mut buf).unwrap(), Received::Idle);
    }
}
