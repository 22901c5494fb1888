//! pcmtap-core - Rotating-buffer PCM capture queue
//!
//! Captures raw PCM from a hardware input device into a small, fixed set of
//! rotating buffers and delivers each filled buffer to a delegate on the
//! engine's callback thread. The [`queue::InputQueue`] owns the buffer pool
//! and a pluggable [`engine::CaptureEngine`] binding (cpal by default) and
//! drives a Created/Running/Paused/Stopped state machine that stays
//! coherent under concurrent control calls and callback re-entrancy.

pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod queue;

pub use buffer::{BufferPool, CaptureBuffer};
pub use config::{DeviceId, QueueConfig, DEFAULT_BUFFER_COUNT, DEFAULT_BUFFER_DURATION_SECS};
pub use error::{QueueError, QueueResult};
pub use format::AudioFormat;
pub use queue::{InputQueue, InputQueueDelegate, QueueState};
