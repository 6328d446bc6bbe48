//! WAV streaming server: one client, raw PCM payload, paced chunks.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::net::{Shutdown, SocketAddr, TcpListener};
use std::path::Path;
use std::thread;
use std::time::Duration;

use super::wav::{self, WavInfo, CANONICAL_HEADER_LEN};
use crate::error::{StreamError, StreamResult};

#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Bytes per send.
    pub chunk_size: usize,
    /// Pause after every chunk. 2ms keeps 16-bit stereo 44.1kHz roughly real time.
    pub pace: Duration,
}

#[derive(Debug, Clone)]
pub struct ServeReport {
    pub peer: SocketAddr,
    pub bytes_sent: u64,
    pub chunks: u64,
}

/// Open a WAV file positioned on its PCM payload.
///
/// Files without a readable RIFF header fall back to skipping the canonical
/// 44 bytes.
pub fn open_wav(path: &Path) -> StreamResult<(File, Option<WavInfo>)> {
    let mut file = File::open(path)?;
    match wav::read_header(&mut file) {
        Ok(info) => {
            log::info!(
                "{}: {}Hz, {} channels, {}-bit, {} bytes of PCM",
                path.display(),
                info.sample_rate,
                info.channels,
                info.bits_per_sample,
                info.data_len
            );
            if info.audio_format != 1 || info.bits_per_sample != 16 {
                log::warn!(
                    "{} is not 16-bit PCM (format {}, {} bits); clients expecting s16 will play noise",
                    path.display(),
                    info.audio_format,
                    info.bits_per_sample
                );
            }
            Ok((file, Some(info)))
        }
        Err(StreamError::InvalidWav(reason)) => {
            log::warn!(
                "{}: {}; skipping a {}-byte header",
                path.display(),
                reason,
                CANONICAL_HEADER_LEN
            );
            file.seek(SeekFrom::Start(CANONICAL_HEADER_LEN))?;
            Ok((file, None))
        }
        Err(e) => Err(e),
    }
}

/// Serve `path` to the first client that connects on `bind`.
pub fn serve_wav(path: &Path, bind: &str, options: &ServeOptions) -> StreamResult<ServeReport> {
    let (file, info) = open_wav(path)?;
    let listener = TcpListener::bind(bind)
        .map_err(|e| StreamError::connection(format!("bind {}", bind), e))?;
    log::info!("Server running on {}...", listener.local_addr()?);

    // Stop at the end of the data chunk unless its length is a placeholder.
    match info.map(|i| i.data_len) {
        Some(len) if len != 0 && len != u32::MAX => {
            serve_one(&listener, file.take(len as u64), options)
        }
        _ => serve_one(&listener, file, options),
    }
}

/// Accept one connection and stream `reader` to it until exhausted.
pub fn serve_one<R: Read>(
    listener: &TcpListener,
    mut reader: R,
    options: &ServeOptions,
) -> StreamResult<ServeReport> {
    if options.chunk_size == 0 {
        return Err(StreamError::InvalidConfig("chunk_size must be non-zero".into()));
    }

    let (mut conn, peer) = listener
        .accept()
        .map_err(|e| StreamError::connection("accept", e))?;
    log::info!("Client connected from {}", peer);

    let mut chunk = vec![0u8; options.chunk_size];
    let mut bytes_sent = 0u64;
    let mut chunks = 0u64;

    loop {
        let n = fill_chunk(&mut reader, &mut chunk)?;
        if n == 0 {
            break;
        }
        conn.write_all(&chunk[..n])
            .map_err(|e| StreamError::connection(format!("send to {}", peer), e))?;
        bytes_sent += n as u64;
        chunks += 1;
        if !options.pace.is_zero() {
            thread::sleep(options.pace);
        }
    }

    let _ = conn.shutdown(Shutdown::Write);
    log::info!("Stream finished: {} bytes in {} chunks", bytes_sent, chunks);

    Ok(ServeReport {
        peer,
        bytes_sent,
        chunks,
    })
}

/// Read until `buf` is full or the reader is exhausted.
fn fill_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> StreamResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
