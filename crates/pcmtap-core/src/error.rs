//! Queue-level error types

use thiserror::Error;

use crate::engine::EngineError;

/// Errors surfaced by the input queue and its accessors
#[derive(Error, Debug)]
pub enum QueueError {
    /// The format descriptor is not internally consistent
    #[error("Invalid audio format: {0}")]
    InvalidFormat(String),

    /// The queue configuration cannot produce a usable buffer pool
    #[error("Invalid queue configuration: {0}")]
    InvalidConfig(String),

    /// The capture engine binding has been disposed and not rebuilt
    #[error("Capture engine is not available (disposed or reset failed)")]
    NotAvailable,

    /// Error reported by the capture engine binding
    #[error("Capture engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_is_wrapped() {
        let err = QueueError::from(EngineError::NoDevices);
        assert!(err.to_string().contains("No audio input devices"));
    }

    #[test]
    fn test_error_display() {
        let err = QueueError::InvalidConfig("buffer count must be at least 1".into());
        assert!(err.to_string().contains("buffer count"));
    }
}
