//! pcmtap-play - One-shot playback of raw PCM byte blocks
//!
//! Consumer-facing adapter for data captured with `pcmtap-core`: hand it a
//! PCM byte block and the [`AudioFormat`](pcmtap_core::AudioFormat) it was
//! captured with, get back a ready-to-play object.

pub mod error;
pub mod player;

pub use error::{PlayerError, PlayerResult};
pub use player::PcmPlayer;
