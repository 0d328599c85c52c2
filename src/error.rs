//! Error types for the live voice pipeline

use thiserror::Error;

/// Result type alias for live voice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while capturing, encoding, or playing live audio
#[derive(Debug, Error)]
pub enum Error {
    /// PCM payload not aligned to whole sample frames
    #[error("malformed audio: {byte_len} bytes is not a multiple of {frame_bytes}")]
    MalformedAudio { byte_len: usize, frame_bytes: usize },

    /// Transport text is not valid base64
    #[error("decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    /// Microphone or output device unavailable or denied
    #[error("device acquisition failed: {0}")]
    DeviceAcquisition(String),

    /// Audio scheduled on an output device that was already released
    #[error("output device released")]
    DeviceReleased,

    /// Transport-level failure of the duplex session
    #[error("session error: {0}")]
    Session(String),

    /// WAV container error
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error only affects a single chunk and the stream can continue
    #[must_use]
    pub const fn is_chunk_local(&self) -> bool {
        matches!(self, Self::MalformedAudio { .. } | Self::Decode(_))
    }
}
