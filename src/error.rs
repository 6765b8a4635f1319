//! # Error Types
//!
//! Custom error types for the flight recorder using `thiserror`.
//!
//! Only [`RecorderError::BufferInvariant`] is fatal to a recording. Failed
//! telemetry reads never surface here, and cleaning or export problems are
//! reported as diagnostics instead of errors.

use thiserror::Error;

/// Main error type for the flight recorder
#[derive(Debug, Error)]
pub enum RecorderError {
    /// A channel has no samples yet
    #[error("no samples recorded for channel {0}")]
    EmptyBuffer(String),

    /// The channel key is not registered
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// The channel key is already registered
    #[error("channel already registered: {0}")]
    DuplicateChannel(String),

    /// The channel key clashes with a key the session document reserves
    #[error("channel key is reserved: {0}")]
    ReservedKey(String),

    /// Channels can only be added or removed between recordings
    #[error("channel set cannot change while recording")]
    ChannelSetLocked,

    /// Operation called in the wrong recorder state
    #[error("invalid recorder state: {0}")]
    InvalidState(String),

    /// A channel series drifted out of step with the elapsed-time series
    #[error("buffer invariant violated: channel {key} has {series_len} samples, elapsed time has {elapsed_len}")]
    BufferInvariant {
        key: String,
        series_len: usize,
        elapsed_len: usize,
    },

    /// Telemetry provider could not be set up
    #[error("telemetry source error: {0}")]
    Source(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Session document encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the flight recorder
pub type Result<T> = std::result::Result<T, RecorderError>;
