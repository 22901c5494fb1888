//! One-shot PCM playback
//!
//! Wraps a decoded PCM byte block plus its format descriptor into a
//! ready-to-play object. There is no state machine here: the cpal stream's
//! own play/pause is the whole control surface, and the only mutable state
//! is an atomic read cursor advanced by the output callback. Playback ends
//! when the block is exhausted; the stream then emits silence.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use pcmtap_core::AudioFormat;

use crate::error::{PlayerError, PlayerResult};

struct PlayerShared {
    pcm: Vec<u8>,
    position: AtomicUsize,
}

/// Check that a byte block and format descriptor can be played.
///
/// Split out of [`PcmPlayer::new`] so the checks are usable (and testable)
/// without touching an output device.
pub fn validate_input(pcm: &[u8], format: &AudioFormat) -> PlayerResult<()> {
    format
        .validate()
        .map_err(|e| PlayerError::UnsupportedFormat(e.to_string()))?;
    if format.is_big_endian != cfg!(target_endian = "big") {
        return Err(PlayerError::UnsupportedFormat(
            "non-native byte order".to_string(),
        ));
    }
    if !matches!(
        (format.is_float, format.bits_per_sample),
        (true, 32) | (false, 16)
    ) {
        return Err(PlayerError::UnsupportedFormat(format!(
            "{}-bit {} PCM (this adapter plays i16 or f32)",
            format.bits_per_sample,
            if format.is_float { "float" } else { "int" }
        )));
    }
    if pcm.is_empty() {
        return Err(PlayerError::EmptyData);
    }
    let frame = format.bytes_per_frame() as usize;
    if pcm.len() % frame != 0 {
        return Err(PlayerError::MisalignedData {
            len: pcm.len(),
            frame,
        });
    }
    Ok(())
}

/// Drain the byte block into the device buffer; silence once exhausted.
/// Single callback thread, so plain load/store on the cursor is enough.
fn fill_output<T: bytemuck::Pod>(data: &mut [T], shared: &Arc<PlayerShared>) {
    let out: &mut [u8] = bytemuck::cast_slice_mut(data);
    let pos = shared.position.load(Ordering::Acquire);
    let n = out.len().min(shared.pcm.len().saturating_sub(pos));
    out[..n].copy_from_slice(&shared.pcm[pos..pos + n]);
    for byte in &mut out[n..] {
        *byte = 0;
    }
    shared.position.store(pos + n, Ordering::Release);
}

/// A ready-to-play one-shot PCM source on the default output device
pub struct PcmPlayer {
    stream: cpal::Stream,
    shared: Arc<PlayerShared>,
    format: AudioFormat,
}

impl PcmPlayer {
    /// Build a player for a decoded PCM byte block.
    ///
    /// The player is created paused; call [`play`](Self::play) to start.
    pub fn new(pcm: Vec<u8>, format: AudioFormat) -> PlayerResult<Self> {
        validate_input(&pcm, &format)?;

        let device = cpal::default_host()
            .default_output_device()
            .ok_or(PlayerError::NoOutputDevice)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Playing PCM on output device: {}", device_name);

        let stream_config = StreamConfig {
            channels: format.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let shared = Arc::new(PlayerShared {
            pcm,
            position: AtomicUsize::new(0),
        });

        let err_fn = |err: cpal::StreamError| {
            log::error!("Playback stream error: {}", err);
        };

        let stream = if format.is_float {
            let cb_shared = shared.clone();
            device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    fill_output(data, &cb_shared);
                },
                err_fn,
                None, // No timeout (blocking)
            )
        } else {
            let cb_shared = shared.clone();
            device.build_output_stream(
                &stream_config,
                move |data: &mut [i16], _info: &cpal::OutputCallbackInfo| {
                    fill_output(data, &cb_shared);
                },
                err_fn,
                None,
            )
        }
        .map_err(|e| PlayerError::StreamBuildError(e.to_string()))?;

        // Some backends start streams eagerly; hold until play() is called
        stream
            .pause()
            .map_err(|e| PlayerError::StreamControlError(e.to_string()))?;

        Ok(Self {
            stream,
            shared,
            format,
        })
    }

    pub fn play(&self) -> PlayerResult<()> {
        self.stream
            .play()
            .map_err(|e| PlayerError::StreamControlError(e.to_string()))
    }

    pub fn pause(&self) -> PlayerResult<()> {
        self.stream
            .pause()
            .map_err(|e| PlayerError::StreamControlError(e.to_string()))
    }

    /// Bytes consumed from the block so far
    pub fn position_bytes(&self) -> usize {
        self.shared.position.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.position_bytes() >= self.shared.pcm.len()
    }

    /// Total playback duration of the block in seconds
    pub fn duration_secs(&self) -> f64 {
        self.shared.pcm.len() as f64 / self.format.bytes_per_second() as f64
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_whole_frames() {
        let fmt = AudioFormat::lpcm_16(44100, 2);
        // 4-byte frames, 3 frames
        assert!(validate_input(&[0u8; 12], &fmt).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_data() {
        let fmt = AudioFormat::lpcm_16(44100, 1);
        assert!(matches!(
            validate_input(&[], &fmt),
            Err(PlayerError::EmptyData)
        ));
    }

    #[test]
    fn test_validate_rejects_partial_frames() {
        let fmt = AudioFormat::lpcm_16(44100, 2);
        assert!(matches!(
            validate_input(&[0u8; 10], &fmt),
            Err(PlayerError::MisalignedData { len: 10, frame: 4 })
        ));
    }

    #[test]
    fn test_validate_rejects_unsupported_descriptors() {
        let mut fmt = AudioFormat::lpcm_16(44100, 1);
        fmt.bits_per_sample = 24;
        assert!(matches!(
            validate_input(&[0u8; 12], &fmt),
            Err(PlayerError::UnsupportedFormat(_))
        ));

        let mut fmt = AudioFormat::lpcm_16(44100, 1);
        fmt.sample_rate = 0;
        assert!(validate_input(&[0u8; 4], &fmt).is_err());

        let mut fmt = AudioFormat::lpcm_16(44100, 1);
        fmt.is_big_endian = !fmt.is_big_endian;
        assert!(matches!(
            validate_input(&[0u8; 4], &fmt),
            Err(PlayerError::UnsupportedFormat(_))
        ));
    }
}
