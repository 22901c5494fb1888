//! Capture engine binding
//!
//! Defines a common interface over the underlying hardware capture
//! primitive. The queue manager drives an engine through this trait and
//! never touches the hardware directly:
//!
//! - Buffers move by value: `enqueue` transfers ownership to the engine,
//!   the completion handler transfers it back. A buffer is never readable
//!   by both sides at once.
//! - Completions arrive on a thread the engine owns (hardware-driven or
//!   engine-internal); everything else is called from the client thread.
//! - `stop` is a quiescence barrier: once it returns, the completion
//!   handler will not be invoked again for this engine instance.
//!
//! The default binding is [`cpal_engine::CpalEngineFactory`]; tests inject
//! a scripted engine through [`CaptureEngineFactory`].

use std::sync::Arc;

use crate::buffer::CaptureBuffer;
use crate::config::QueueConfig;
use crate::format::AudioFormat;

mod error;

pub mod cpal_engine;
pub mod device;

#[cfg(test)]
pub(crate) mod mock;

pub use error::{EngineError, EngineResult};

/// Identifier into an engine's property table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyId(pub u32);

/// Identifier into an engine's parameter table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParameterId(pub u32);

/// Well-known property ids
pub mod properties {
    use super::PropertyId;

    /// Name of the bound input device (UTF-8 bytes, read-only)
    pub const DEVICE_NAME: PropertyId = PropertyId(0x0001);
    /// Byte capacity of each capture buffer (u32 little-endian, read-only)
    pub const BUFFER_SIZE_BYTES: PropertyId = PropertyId(0x0002);
    /// Whether the engine is currently capturing (one byte, 0/1, read-only)
    pub const IS_RUNNING: PropertyId = PropertyId(0x0003);
}

/// Well-known parameter ids
pub mod parameters {
    use super::ParameterId;

    /// Linear gain applied to captured samples before buffering (default 1.0)
    pub const INPUT_GAIN: ParameterId = ParameterId(0x0001);
}

/// A rejected `enqueue`. The buffer travels back inside the error, the same
/// shape as a channel's `TrySendError`, so the caller can return it to the
/// pool and no buffer is ever lost to a rejection.
#[derive(Debug)]
pub struct EnqueueError {
    pub buffer: CaptureBuffer,
    pub reason: EngineError,
}

/// A completed unit of engine work, delivered on the engine's callback thread.
pub enum Completion {
    /// A capture buffer has been filled. Ownership of the buffer returns to
    /// the receiver; the engine keeps no reference to it.
    Data { buffer: CaptureBuffer, packets: u32 },
    /// An asynchronous engine fault (device disconnect, stream error).
    /// Does not imply capture has stopped.
    Error(EngineError),
}

/// Callback invoked by the engine when a buffer completes or a fault occurs.
///
/// The queue manager installs a closure that captures a weak reference to
/// its shared state and dispatches into it; the closure goes inert once the
/// queue is gone.
pub type CompletionHandler = Box<dyn FnMut(Completion) + Send>;

/// Interface to the hardware capture primitive.
///
/// Methods take `&self`; implementations synchronize internally (the same
/// shape as `cpal::Stream`), which lets `enqueue` be called re-entrantly
/// from inside the completion handler without deadlocking.
pub trait CaptureEngine: Send + Sync {
    /// Begin (or resume) capturing into enqueued buffers.
    fn start(&self) -> EngineResult<()>;

    /// Stop accepting new data. Buffers already filled still complete.
    fn pause(&self) -> EngineResult<()>;

    /// Stop capturing. Quiescence barrier: after this returns, no further
    /// completion fires for this engine instance. Buffers still owned by
    /// the engine are reclaimed by the engine itself.
    fn stop(&self) -> EngineResult<()>;

    /// Hand a buffer to the engine to be filled. The engine owns it until
    /// the completion handler gives it back; on rejection the buffer comes
    /// back inside the error.
    fn enqueue(&self, buffer: CaptureBuffer) -> Result<(), EnqueueError>;

    /// Pull back all pending (unfilled) buffers. Used to roll back a failed
    /// start so the queue never leaves a partial transition behind.
    fn reclaim(&self) -> Vec<CaptureBuffer>;

    /// Required byte alignment for capture buffers (1 = none).
    fn buffer_alignment(&self) -> usize {
        1
    }

    fn set_property(&self, id: PropertyId, data: &[u8]) -> EngineResult<()>;
    fn get_property(&self, id: PropertyId) -> EngineResult<Vec<u8>>;
    fn set_parameter(&self, id: ParameterId, value: f32) -> EngineResult<()>;
    fn get_parameter(&self, id: ParameterId) -> EngineResult<f32>;
}

/// Creates capture engine bindings.
///
/// The queue holds a factory rather than a single engine so that `reset`
/// can dispose the current binding and build a fresh one with the same
/// format, and so tests can substitute a scripted engine.
pub trait CaptureEngineFactory: Send + Sync {
    fn create(
        &self,
        format: &AudioFormat,
        config: &QueueConfig,
        handler: CompletionHandler,
    ) -> EngineResult<Arc<dyn CaptureEngine>>;
}
