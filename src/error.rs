//! Error types for the hark voice pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice pipeline
///
/// None of these are fatal to a running session: stale and underrun
/// conditions skip a tick and retry, backend failures surface as an
/// unsuccessful transcription, and device errors leave the session idle
/// until the caller reinitializes capture.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Capture device not initialized or unavailable
    #[error("device not ready: {0}")]
    DeviceNotReady(String),

    /// Audio device or stream error
    #[error("audio error: {0}")]
    Audio(String),

    /// Requested window has already been overwritten in the ring
    #[error("stale data: window starting at frame {start_frame} overwritten (cursor {cursor}, capacity {capacity})")]
    DataStale {
        /// First frame of the requested window
        start_frame: i64,
        /// Current write cursor
        cursor: i64,
        /// Ring capacity in frames
        capacity: usize,
    },

    /// Requested window extends past the data written so far
    #[error("buffer underrun: requested {requested} frames ending at {end_frame}, cursor at {cursor}")]
    BufferUnderrun {
        /// Frame just past the requested window
        end_frame: i64,
        /// Frames requested
        requested: usize,
        /// Current write cursor
        cursor: i64,
    },

    /// Transcription backend failure
    #[error("transcription error: {0}")]
    Stt(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
