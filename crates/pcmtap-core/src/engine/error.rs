//! Capture engine error types

use thiserror::Error;

/// Errors reported by a capture engine binding
#[derive(Error, Debug)]
pub enum EngineError {
    /// No audio input devices available
    #[error("No audio input devices found")]
    NoDevices,

    /// Failed to get default device
    #[error("Failed to get default audio input device: {0}")]
    NoDefaultDevice(String),

    /// Device not found
    #[error("Audio input device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to get device configuration
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    /// The engine cannot capture in the requested format
    #[error("Unsupported capture format: {0}")]
    UnsupportedFormat(String),

    /// Failed to build the capture stream
    #[error("Failed to build capture stream: {0}")]
    StreamBuildError(String),

    /// Failed to start/resume the capture stream
    #[error("Failed to start capture stream: {0}")]
    StreamStartError(String),

    /// Failed to pause the capture stream
    #[error("Failed to pause capture stream: {0}")]
    StreamPauseError(String),

    /// Asynchronous stream error during capture
    #[error("Capture stream error: {0}")]
    StreamError(String),

    /// The engine refused to accept a buffer
    #[error("Buffer rejected by capture engine: {0}")]
    EnqueueRejected(String),

    /// Command issued after the engine was stopped
    #[error("Capture engine is stopped")]
    Stopped,

    /// Property id not in the engine's property table
    #[error("Unknown property id: {0:#06x}")]
    UnknownProperty(u32),

    /// Parameter id not in the engine's parameter table
    #[error("Unknown parameter id: {0:#06x}")]
    UnknownParameter(u32),

    /// Parameter value outside the accepted range
    #[error("Invalid value {value} for parameter {id:#06x}")]
    InvalidParameterValue { id: u32, value: f32 },

    /// Property value has the wrong size
    #[error("Property {id:#06x} expects {expected} bytes, got {actual}")]
    PropertySizeMismatch {
        id: u32,
        expected: usize,
        actual: usize,
    },

    /// Property cannot be written
    #[error("Property {0:#06x} is read-only")]
    PropertyReadOnly(u32),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::PropertySizeMismatch {
            id: 0x0002,
            expected: 4,
            actual: 1,
        };
        assert!(err.to_string().contains("0x0002"));
        assert!(err.to_string().contains("4 bytes"));

        let err = EngineError::DeviceNotFound("hw:9,0".to_string());
        assert!(err.to_string().contains("hw:9,0"));
    }
}
