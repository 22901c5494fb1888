//! Capture buffers and the fixed-size buffer pool
//!
//! A `CaptureBuffer` has exactly one owner at any instant: either the engine
//! binding (which may write into it) or the queue manager (for which it is
//! safe to read). Ownership is expressed with moves: `enqueue` takes the
//! buffer by value and the completion callback hands it back, so the
//! "never read while the hardware owns it" invariant is enforced by the
//! compiler rather than by a flag.

use crate::error::{QueueError, QueueResult};
use crate::format::AudioFormat;

/// A fixed-capacity byte region for one batch of captured audio.
#[derive(Debug)]
pub struct CaptureBuffer {
    data: Vec<u8>,
    filled: usize,
    packets: u32,
}

impl CaptureBuffer {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            filled: 0,
            packets: 0,
        }
    }

    /// Total byte capacity, fixed at allocation.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// The valid byte range written by the engine (not the full capacity).
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.filled]
    }

    /// Packet count recorded for the current contents.
    pub fn packets(&self) -> u32 {
        self.packets
    }

    pub fn is_full(&self) -> bool {
        self.filled == self.data.len()
    }

    /// Copy as many bytes as fit from `src` into the unfilled region.
    /// Returns the number of bytes consumed. Engine-side use only.
    pub fn fill_from(&mut self, src: &[u8]) -> usize {
        let spare = self.data.len() - self.filled;
        let n = src.len().min(spare);
        self.data[self.filled..self.filled + n].copy_from_slice(&src[..n]);
        self.filled += n;
        n
    }

    /// Record the packet count for the current contents. Engine-side use only.
    pub fn set_packets(&mut self, packets: u32) {
        self.packets = packets;
    }

    /// Discard contents so the buffer can be handed back to the engine.
    pub fn clear(&mut self) {
        self.filled = 0;
        self.packets = 0;
    }
}

/// A fixed set of pre-allocated capture buffers.
///
/// All buffers are allocated once at construction, sized
/// `ceil(duration × bytes_per_second)` rounded up to the engine's alignment,
/// and released only when the pool is dropped. The count is fixed; the pool
/// never grows or shrinks.
#[derive(Debug)]
pub struct BufferPool {
    buffers: Vec<CaptureBuffer>,
    buffer_size: usize,
    buffer_count: usize,
}

impl BufferPool {
    /// Placeholder pool used while a queue wires up its engine binding
    pub(crate) fn empty() -> Self {
        Self {
            buffers: Vec::new(),
            buffer_size: 0,
            buffer_count: 0,
        }
    }

    pub fn new(
        format: &AudioFormat,
        duration_secs: f64,
        count: usize,
        alignment: usize,
    ) -> QueueResult<Self> {
        if count == 0 {
            return Err(QueueError::InvalidConfig(
                "buffer count must be at least 1".into(),
            ));
        }
        let alignment = alignment.max(1);

        let raw = (duration_secs * format.bytes_per_second() as f64).ceil() as usize;
        // A buffer must hold at least one whole packet to be useful
        let raw = raw.max(format.bytes_per_packet() as usize);
        if raw == 0 {
            return Err(QueueError::InvalidConfig(
                "derived buffer size is zero".into(),
            ));
        }
        let buffer_size = raw.div_ceil(alignment) * alignment;

        log::debug!(
            "Allocating buffer pool: {} buffers x {} bytes ({}s at {} B/s, alignment {})",
            count,
            buffer_size,
            duration_secs,
            format.bytes_per_second(),
            alignment
        );

        let buffers = (0..count)
            .map(|_| CaptureBuffer::with_capacity(buffer_size))
            .collect();

        Ok(Self {
            buffers,
            buffer_size,
            buffer_count: count,
        })
    }

    /// Byte capacity of each buffer in the pool.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Number of buffers the pool was allocated with.
    pub fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    /// Buffers currently held by the pool (not owned by the engine).
    pub fn available(&self) -> usize {
        self.buffers.len()
    }

    /// Hand every pooled buffer out, ready to be enqueued with the engine.
    pub fn take_all(&mut self) -> Vec<CaptureBuffer> {
        std::mem::take(&mut self.buffers)
    }

    /// Return a buffer to the pool (used while the queue drains down).
    pub fn put(&mut self, mut buffer: CaptureBuffer) {
        buffer.clear();
        self.buffers.push(buffer);
    }
}
