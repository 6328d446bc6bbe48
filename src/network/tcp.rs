//! TCP byte source.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::audio::source::ReadSource;
use crate::error::{StreamError, StreamResult};

pub type TcpSource = ReadSource<TcpStream>;

impl ReadSource<TcpStream> {
    /// Connect to `address`, trying each resolved address in turn.
    ///
    /// `read_timeout` bounds every receive so the producer can notice a stop
    /// request while the server is quiet.
    pub fn connect(
        address: &str,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> StreamResult<Self> {
        let addrs: Vec<SocketAddr> = address
            .to_socket_addrs()
            .map_err(|e| StreamError::connection(format!("resolve {}", address), e))?
            .collect();

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, connect_timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(read_timeout))?;
                    stream.set_nodelay(true)?;
                    log::info!("Connected to {}", addr);
                    return Ok(ReadSource::new(stream, format!("tcp://{}", addr)));
                }
                Err(e) => {
                    log::debug!("Connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }

        let err = last_err.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved")
        });
        Err(StreamError::connection(format!("connect to {}", address), err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::source::{ByteSource, Received};
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn receives_bytes_then_idles_then_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            conn.write_all(&[1, 2, 3, 4]).unwrap();
            thread::sleep(Duration::from_millis(150));
        });

        let mut source =
            TcpSource::connect(&addr, Duration::from_secs(2), Duration::from_millis(30)).unwrap();
        assert!(source.describe().starts_with("tcp://"));

        let mut buf = [0u8; 16];
        let mut got = Vec::new();
        let mut idled = false;
        loop {
            match source.receive(&mut buf).unwrap() {
                Received::Data(n) => got.extend_from_slice(&buf[..n]),
                Received::Idle => idled = true,
                Received::Closed => break,
            }
        }
        server.join().unwrap();

        assert_eq!(got, vec![1, 2, 3, 4]);
        assert!(idled, "read timeout should surface as idle");
    }

    #[test]
    fn refused_connection_is_reported() {
        // Bind then drop to get a port nobody listens on.
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let err = TcpSource::connect(
            &format!("127.0.0.1:{}", port),
            Duration::from_millis(500),
            Duration::from_millis(50),
        )
        .err()
        .unwrap();
        assert!(matches!(err, StreamError::Connection { .. }));
    }
}
