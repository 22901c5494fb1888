//! Capture queue configuration
//!
//! Defines the construction-time settings for an input queue: how long each
//! capture buffer should be, how many of them rotate through the engine, and
//! which input device to bind to. All of it is read-only once the queue
//! exists; the pool is sized at construction and never resized.

use serde::{Deserialize, Serialize};

use crate::error::{QueueError, QueueResult};

/// Number of rotating capture buffers used when none is requested.
/// Three is enough to keep the engine fed while one buffer is being drained.
pub const DEFAULT_BUFFER_COUNT: usize = 3;

/// Buffer duration used when none is requested (seconds)
pub const DEFAULT_BUFFER_DURATION_SECS: f64 = 0.5;

/// Shortest accepted buffer duration (seconds)
///
/// Below this the per-buffer capacity collapses to a handful of frames and
/// the completion rate becomes dominated by callback overhead.
pub const MIN_BUFFER_DURATION_SECS: f64 = 0.005;

/// Audio input device identifier
///
/// Includes both the device name and the host backend (ALSA, WASAPI, etc.)
/// so devices can be selected on systems with multiple audio hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Audio host identifier (e.g. "ALSA", "CoreAudio")
    /// If None, uses the default/preferred host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Get a display label that includes the host if available
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Configuration for an input capture queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Requested time span of each capture buffer (seconds).
    /// Per-buffer byte capacity is derived from this and the format's
    /// byte rate, rounded up to the engine's alignment.
    pub buffer_duration_secs: f64,

    /// Number of buffers rotating through the engine.
    /// Fixed at construction; not exposed for runtime change.
    pub buffer_count: usize,

    /// Input device to capture from (None = system default)
    pub device: Option<DeviceId>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            buffer_duration_secs: DEFAULT_BUFFER_DURATION_SECS,
            buffer_count: DEFAULT_BUFFER_COUNT,
            device: None,
        }
    }
}

impl QueueConfig {
    /// Set the per-buffer duration in seconds
    pub fn with_buffer_duration(mut self, secs: f64) -> Self {
        self.buffer_duration_secs = secs;
        self
    }

    /// Set the number of rotating capture buffers
    pub fn with_buffer_count(mut self, count: usize) -> Self {
        self.buffer_count = count;
        self
    }

    /// Set the input device
    pub fn with_device(mut self, device: DeviceId) -> Self {
        self.device = Some(device);
        self
    }

    /// Check that the configuration can produce a usable buffer pool.
    pub fn validate(&self) -> QueueResult<()> {
        if !self.buffer_duration_secs.is_finite()
            || self.buffer_duration_secs < MIN_BUFFER_DURATION_SECS
        {
            return Err(QueueError::InvalidConfig(format!(
                "buffer duration {}s is below the minimum of {}s",
                self.buffer_duration_secs, MIN_BUFFER_DURATION_SECS
            )));
        }
        if self.buffer_count == 0 {
            return Err(QueueError::InvalidConfig(
                "buffer count must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
