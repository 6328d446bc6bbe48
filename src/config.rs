//! Stream configuration.
//!
//! Capacity, chunk and callback sizes are checked together at startup so a
//! chunk that can never fit in the buffer fails fast instead of deadlocking
//! the network thread later. Stored as JSON.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{StreamError, StreamResult};

/// PCM sample layout of the incoming byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// Signed 16-bit little-endian (plain WAV).
    S16,
    /// 32-bit float little-endian.
    F32,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S16 => 2,
            SampleFormat::F32 => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Server to pull the byte stream from.
    pub address: String,
    /// Ring buffer size in bytes.
    pub capacity: usize,
    pub sample_rate: u32,
    pub channel_count: u16,
    pub sample_format: SampleFormat,
    /// Frames the device pulls per callback.
    pub frames_per_callback: u32,
    /// Largest chunk a single network receive may deliver.
    pub chunk_size: usize,
    pub read_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Audio to buffer before the device starts pulling (0 = start at once).
    pub prebuffer_ms: u64,
    /// Output device name (None = system default).
    pub device: Option<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".into(),
            capacity: 1024 * 1024,
            sample_rate: 44100,
            channel_count: 2,
            sample_format: SampleFormat::S16,
            frames_per_callback: 1024,
            chunk_size: 4096,
            read_timeout_ms: 250,
            connect_timeout_ms: 5000,
            prebuffer_ms: 0,
            device: None,
        }
    }
}

impl StreamConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> StreamResult<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: StreamConfig = serde_json::from_str(&data)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> StreamResult<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.sample_format.bytes_per_sample()
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.channel_count as usize * self.bytes_per_sample()
    }

    /// Bytes requested by every device callback.
    pub fn callback_bytes(&self) -> usize {
        self.frames_per_callback as usize * self.bytes_per_frame()
    }

    /// Byte rate of the stream at the configured format.
    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.bytes_per_frame()
    }

    /// Wall time between two device callbacks.
    pub fn callback_period(&self) -> Duration {
        Duration::from_secs_f64(self.frames_per_callback as f64 / self.sample_rate.max(1) as f64)
    }

    /// Prebuffer target in bytes, rounded down to whole frames.
    pub fn prebuffer_bytes(&self) -> usize {
        let raw = self.bytes_per_second() as u64 * self.prebuffer_ms / 1000;
        let frame = self.bytes_per_frame() as u64;
        (raw - raw % frame) as usize
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Reject settings that could never run correctly.
    pub fn validate(&self) -> StreamResult<()> {
        let fields = [
            ("capacity", self.capacity as u64),
            ("sample_rate", self.sample_rate as u64),
            ("channel_count", self.channel_count as u64),
            ("frames_per_callback", self.frames_per_callback as u64),
            ("chunk_size", self.chunk_size as u64),
            ("read_timeout_ms", self.read_timeout_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, v)| *v == 0) {
            return Err(StreamError::InvalidConfig(format!("{} must be non-zero", name)));
        }

        if self.chunk_size > self.capacity {
            return Err(StreamError::InvalidConfig(format!(
                "chunk_size ({}) exceeds ring buffer capacity ({}); a full chunk could never be written",
                self.chunk_size, self.capacity
            )));
        }
        if self.callback_bytes() > self.capacity {
            return Err(StreamError::InvalidConfig(format!(
                "one callback needs {} bytes but capacity is only {}",
                self.callback_bytes(),
                self.capacity
            )));
        }
        // Producer waits while occupied > capacity - chunk, callback underruns
        // while occupied < callback bytes. Those ranges must not overlap.
        let needed = self.chunk_size + self.callback_bytes() - 1;
        if self.capacity < needed {
            return Err(StreamError::InvalidConfig(format!(
                "capacity ({}) must be at least chunk_size + callback bytes - 1 ({}); \
                 otherwise the network writer and the audio callback can wait on each other forever",
                self.capacity, needed
            )));
        }
        if self.capacity % self.bytes_per_frame() != 0 {
            return Err(StreamError::InvalidConfig(format!(
                "capacity ({}) is not a whole number of {}-byte frames",
                self.capacity,
                self.bytes_per_frame()
            )));
        }
        if self.prebuffer_bytes() > self.capacity {
            return Err(StreamError::InvalidConfig(format!(
                "prebuffer of {}ms ({} bytes) does not fit in capacity ({})",
                self.prebuffer_ms,
                self.prebuffer_bytes(),
                self.capacity
            )));
        }
        Ok(())
    }
}
