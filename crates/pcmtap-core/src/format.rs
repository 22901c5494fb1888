//! Linear-PCM format descriptor
//!
//! `AudioFormat` is supplied when a capture queue is constructed and stays
//! immutable for the queue's lifetime. The queue moves captured bytes around
//! without interpreting them; the descriptor exists so buffer capacities and
//! packet counts can be derived, and so the engine binding can open a device
//! stream that matches what the caller asked for.

use serde::{Deserialize, Serialize};

use crate::error::{QueueError, QueueResult};

/// Description of a linear-PCM stream.
///
/// Compressed formats may pack several frames into one packet; for PCM the
/// packet is the frame, so `frames_per_packet` is almost always 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz (e.g. 44100, 48000)
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
    /// Bits per sample per channel (8, 16, 24 or 32)
    pub bits_per_sample: u16,
    /// Frames per packet (1 for PCM)
    pub frames_per_packet: u32,
    /// Samples are IEEE float rather than signed integer
    #[serde(default)]
    pub is_float: bool,
    /// Samples are big-endian on the wire
    #[serde(default)]
    pub is_big_endian: bool,
}

impl AudioFormat {
    /// Signed 16-bit integer PCM in native byte order.
    pub fn lpcm_16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 16,
            frames_per_packet: 1,
            is_float: false,
            is_big_endian: cfg!(target_endian = "big"),
        }
    }

    /// 32-bit float PCM in native byte order.
    pub fn lpcm_f32(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 32,
            frames_per_packet: 1,
            is_float: true,
            is_big_endian: cfg!(target_endian = "big"),
        }
    }

    /// Check that the descriptor is internally consistent.
    ///
    /// A queue refuses construction for formats that fail here, so the rest
    /// of the crate can rely on the derived byte math being non-zero.
    pub fn validate(&self) -> QueueResult<()> {
        if self.sample_rate == 0 {
            return Err(QueueError::InvalidFormat("sample rate is zero".into()));
        }
        if self.channels == 0 {
            return Err(QueueError::InvalidFormat("channel count is zero".into()));
        }
        if !matches!(self.bits_per_sample, 8 | 16 | 24 | 32) {
            return Err(QueueError::InvalidFormat(format!(
                "unsupported bit depth: {}",
                self.bits_per_sample
            )));
        }
        if self.is_float && self.bits_per_sample != 32 {
            return Err(QueueError::InvalidFormat(format!(
                "float PCM must be 32-bit, got {}",
                self.bits_per_sample
            )));
        }
        if self.frames_per_packet == 0 {
            return Err(QueueError::InvalidFormat("frames per packet is zero".into()));
        }
        Ok(())
    }

    /// Bytes for one interleaved frame (all channels).
    pub fn bytes_per_frame(&self) -> u32 {
        self.channels as u32 * (self.bits_per_sample as u32 / 8)
    }

    /// Bytes for one packet.
    pub fn bytes_per_packet(&self) -> u32 {
        self.bytes_per_frame() * self.frames_per_packet
    }

    /// Byte rate of the stream, used to size capture buffers from a duration.
    pub fn bytes_per_second(&self) -> u64 {
        self.sample_rate as u64 * self.bytes_per_frame() as u64
    }

    /// Number of whole packets contained in `len` bytes.
    pub fn packets_for_bytes(&self, len: usize) -> u32 {
        let per_packet = self.bytes_per_packet() as usize;
        if per_packet == 0 {
            return 0;
        }
        (len / per_packet) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_math_mono_16() {
        let fmt = AudioFormat::lpcm_16(44100, 1);
        assert_eq!(fmt.bytes_per_frame(), 2);
        assert_eq!(fmt.bytes_per_packet(), 2);
        assert_eq!(fmt.bytes_per_second(), 88200);
        assert_eq!(fmt.packets_for_bytes(44100), 22050);
    }

    #[test]
    fn test_byte_math_stereo_f32() {
        let fmt = AudioFormat::lpcm_f32(48000, 2);
        assert_eq!(fmt.bytes_per_frame(), 8);
        assert_eq!(fmt.bytes_per_second(), 384_000);
        // Partial packets are not counted
        assert_eq!(fmt.packets_for_bytes(9), 1);
    }

    #[test]
    fn test_validate_rejects_bad_descriptors() {
        let mut fmt = AudioFormat::lpcm_16(44100, 1);
        assert!(fmt.validate().is_ok());

        fmt.sample_rate = 0;
        assert!(fmt.validate().is_err());

        let mut fmt = AudioFormat::lpcm_16(44100, 1);
        fmt.channels = 0;
        assert!(fmt.validate().is_err());

        let mut fmt = AudioFormat::lpcm_16(44100, 1);
        fmt.bits_per_sample = 12;
        assert!(fmt.validate().is_err());

        let mut fmt = AudioFormat::lpcm_16(44100, 1);
        fmt.is_float = true;
        assert!(fmt.validate().is_err(), "16-bit float must be rejected");

        let mut fmt = AudioFormat::lpcm_16(44100, 1);
        fmt.frames_per_packet = 0;
        assert!(fmt.validate().is_err());
    }
}
