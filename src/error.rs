//! Error types for the streaming player.

use std::io;

/// Everything that can go wrong between the network and the audio device.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Plain I/O failure (socket read, file access).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Connection-related errors
    #[error("Connection error during {operation}: {source}")]
    Connection {
        operation: String,
        #[source]
        source: io::Error,
    },

    /// Rejected at startup; the stream never runs with these settings.
    #[error("Invalid stream configuration: {0}")]
    InvalidConfig(String),

    /// A single write that could never fit, even into an empty buffer.
    #[error("Write of {len} bytes exceeds ring buffer capacity of {capacity} bytes")]
    OversizedWrite { len: usize, capacity: usize },

    /// The ring buffer was closed while a writer was waiting for space.
    #[error("Ring buffer closed")]
    Closed,

    /// Output device could not be opened, configured or started.
    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Invalid WAV data: {0}")]
    InvalidWav(String),
}

impl StreamError {
    /// Wrap an I/O error with the operation that produced it.
    pub fn connection(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Connection {
            operation: operation.into(),
            source,
        }
    }

    pub fn device(err: impl std::fmt::Display) -> Self {
        Self::Device(err.to_string())
    }

    /// Configuration faults are caught before anything starts; everything
    /// else surfaces while running.
    pub fn is_startup_fault(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_) | Self::OversizedWrite { .. } | Self::ConfigParse(_)
        )
    }
}

pub type StreamResult<T> = Result<T, StreamError>;
