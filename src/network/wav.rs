//! Minimal RIFF/WAVE header reader. Only locates the PCM payload and reports
//! its format; samples are never decoded.

use std::io::{self, Read};

use crate::error::{StreamError, StreamResult};

/// Size of the canonical 44-byte PCM WAV header.
pub const CANONICAL_HEADER_LEN: u64 = 44;

/// Largest `fmt ` chunk accepted (WAVE_FORMAT_EXTENSIBLE is 40 bytes).
const MAX_FMT_LEN: u32 = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavInfo {
    pub audio_format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Byte offset of the first PCM byte.
    pub data_offset: u64,
    /// Declared payload length in bytes.
    pub data_len: u32,
}

fn u16_at(b: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([b[at], b[at + 1]])
}

fn u32_at(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

fn read_exact_or_invalid<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> StreamResult<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => StreamError::InvalidWav(format!("truncated {}", what)),
        _ => StreamError::Io(e),
    })
}

/// Read chunk headers up to the `data` chunk, leaving `reader` positioned on
/// the first payload byte.
pub fn read_header<R: Read>(reader: &mut R) -> StreamResult<WavInfo> {
    let mut riff = [0u8; 12];
    read_exact_or_invalid(reader, &mut riff, "RIFF header")?;
    if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
        return Err(StreamError::InvalidWav("missing RIFF/WAVE signature".into()));
    }

    let mut offset = riff.len() as u64;
    let mut format: Option<(u16, u16, u32, u16)> = None;

    loop {
        let mut chunk = [0u8; 8];
        read_exact_or_invalid(reader, &mut chunk, "chunk header")?;
        offset += 8;
        let size = u32_at(&chunk, 4);

        match &chunk[0..4] {
            b"fmt " => {
                if !(16..=MAX_FMT_LEN).contains(&size) {
                    return Err(StreamError::InvalidWav(format!("fmt chunk of {} bytes", size)));
                }
                let mut body = vec![0u8; size as usize];
                read_exact_or_invalid(reader, &mut body, "fmt chunk")?;
                format = Some((
                    u16_at(&body, 0),
                    u16_at(&body, 2),
                    u32_at(&body, 4),
                    u16_at(&body, 14),
                ));
            }
            b"data" => {
                let (audio_format, channels, sample_rate, bits_per_sample) = format
                    .ok_or_else(|| StreamError::InvalidWav("data chunk before fmt chunk".into()))?;
                return Ok(WavInfo {
                    audio_format,
                    channels,
                    sample_rate,
                    bits_per_sample,
                    data_offset: offset,
                    data_len: size,
                });
            }
            _ => {
                let skipped = io::copy(&mut (&mut *reader).take(size as u64), &mut io::sink())?;
                if skipped < size as u64 {
                    return Err(StreamError::InvalidWav("truncated chunk".into()));
                }
            }
        }

        // Chunks are word aligned.
        let padded = size as u64 + (size as u64 & 1);
        if padded > size as u64 {
            let mut pad = [0u8; 1];
            read_exact_or_invalid(reader, &mut pad, "chunk padding")?;
        }
        offset += padded;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    /// Build a PCM WAV file image with an optional extra chunk before `data`.
    pub(crate) fn wav_bytes(
        sample_rate: u32,
        channels: u16,
        payload: &[u8],
        extra: Option<(&[u8; 4], &[u8])>,
    ) -> Vec<u8> {
        let mut fmt = Vec::new();
        fmt.extend_from_slice(&1u16.to_le_bytes());
        fmt.extend_from_slice(&channels.to_le_bytes());
        fmt.extend_from_slice(&sample_rate.to_le_bytes());
        fmt.extend_from_slice(&(sample_rate * channels as u32 * 2).to_le_bytes());
        fmt.extend_from_slice(&(channels * 2).to_le_bytes());
        fmt.extend_from_slice(&16u16.to_le_bytes());

        let mut body = Vec::new();
        body.extend_from_slice(b"WAVE");
        body.extend_from_slice(b"fmt ");
        body.extend_from_slice(&(fmt.len() as u32).to_le_bytes());
        body.extend_from_slice(&fmt);
        if let Some((id, data)) = extra {
            body.extend_from_slice(id);
            body.extend_from_slice(&(data.len() as u32).to_le_bytes());
            body.extend_from_slice(data);
            if data.len() % 2 == 1 {
                body.push(0);
            }
        }
        body.extend_from_slice(b"data");
        body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        body.extend_from_slice(payload);

        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn canonical_header_is_44_bytes() {
        let bytes = wav_bytes(44100, 2, &[1, 2, 3, 4], None);
        let mut cursor = Cursor::new(bytes);
        let info = read_header(&mut cursor).unwrap();

        assert_eq!(info.data_offset, CANONICAL_HEADER_LEN);
        assert_eq!(info.sample_rate, 44100);
        assert_eq!(info.channels, 2);
        assert_eq!(info.bits_per_sample, 16);
        assert_eq!(info.data_len, 4);
        assert_eq!(cursor.position(), CANONICAL_HEADER_LEN);
    }

    #[test]
    fn skips_odd_sized_extra_chunk() {
        let bytes = wav_bytes(22050, 1, &[9, 9], Some((b"LIST", &[0x41u8, 0x42, 0x43][..])));
        let mut cursor = Cursor::new(bytes);
        let info = read_header(&mut cursor).unwrap();

        // 44 + 8 (LIST header) + 3 + 1 pad
        assert_eq!(info.data_offset, 56);
        assert_eq!(cursor.position(), 56);
        let mut rest = Vec::new();
        cursor.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, vec![9, 9]);
    }

    #[test]
    fn rejects_non_wav() {
        let mut cursor = Cursor::new(b"ID3\x04 definitely an mp3 file".to_vec());
        assert!(matches!(
            read_header(&mut cursor),
            Err(StreamError::InvalidWav(_))
        ));
    }

    #[test]
    fn rejects_oversized_fmt_chunk() {
        let mut bytes = wav_bytes(44100, 2, &[1, 2], None);
        // fmt chunk size field sits right after "RIFF....WAVEfmt ".
        bytes[16..20].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            read_header(&mut Cursor::new(bytes)),
            Err(StreamError::InvalidWav(_))
        ));
    }

    #[test]
    fn rejects_missing_data_chunk() {
        let mut bytes = wav_bytes(8000, 1, &[], None);
        bytes.truncate(36);
        assert!(matches!(
            read_header(&mut Cursor::new(bytes)),
            Err(StreamError::InvalidWav(_))
        ));
    }
}
