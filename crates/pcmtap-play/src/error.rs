//! Playback adapter error types

use thiserror::Error;

/// Errors that can occur while building or controlling a one-shot player
#[derive(Error, Debug)]
pub enum PlayerError {
    /// No PCM bytes were supplied
    #[error("PCM data is empty")]
    EmptyData,

    /// Data length does not divide into whole frames
    #[error("PCM data length {len} is not a whole number of {frame}-byte frames")]
    MisalignedData { len: usize, frame: usize },

    /// The format descriptor cannot be played by this adapter
    #[error("Unsupported playback format: {0}")]
    UnsupportedFormat(String),

    /// No output device available
    #[error("No audio output device available")]
    NoOutputDevice,

    /// Failed to build the playback stream
    #[error("Failed to build playback stream: {0}")]
    StreamBuildError(String),

    /// Failed to start/pause the playback stream
    #[error("Failed to control playback stream: {0}")]
    StreamControlError(String),
}

/// Result type for playback operations
pub type PlayerResult<T> = Result<T, PlayerError>;
