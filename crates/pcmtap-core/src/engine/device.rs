//! Input device enumeration and lookup
//!
//! Enumerates capture devices from ALL available audio hosts so callers can
//! pick a specific hardware input on systems with multiple backends (e.g.
//! ALSA hardware devices alongside a sound server's single virtual device).

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use crate::config::DeviceId;

use super::error::{EngineError, EngineResult};

/// Get a human-readable name for a host ID
fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

/// Get a host by its name string
fn get_host_by_name(name: &str) -> Option<Host> {
    for host_id in cpal::available_hosts() {
        if host_name(host_id) == name {
            return cpal::host_from_id(host_id).ok();
        }
    }
    None
}

/// Information about an audio input device
#[derive(Debug, Clone)]
pub struct AudioInputDevice {
    /// Device identifier for configuration (includes host info)
    pub id: DeviceId,
    /// Human-readable device name
    pub name: String,
    /// Host backend name (e.g. "ALSA", "CoreAudio")
    pub host: String,
    /// Whether this is the system default input for its host
    pub is_default: bool,
    /// Supported sample rates (common ones)
    pub sample_rates: Vec<u32>,
    /// Maximum input channels
    pub max_channels: u16,
}

/// Get all available audio input devices from ALL hosts
pub fn get_input_devices() -> Vec<AudioInputDevice> {
    let mut all_devices: Vec<AudioInputDevice> = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };

        let host_name_str = host_name(host_id);

        let default_device_name = host
            .default_input_device()
            .and_then(|d: cpal::Device| d.name().ok());

        let devices_iter = match host.input_devices() {
            Ok(d) => d,
            Err(e) => {
                log::debug!("Could not enumerate inputs for {:?}: {}", host_id, e);
                continue;
            }
        };

        for device in devices_iter {
            let name = match device.name() {
                Ok(n) => n,
                Err(_) => continue,
            };

            let is_default = default_device_name.as_ref() == Some(&name);

            let configs: Vec<_> = match device.supported_input_configs() {
                Ok(c) => c.collect(),
                Err(_) => continue,
            };

            if configs.is_empty() {
                continue;
            }

            let mut sample_rates: Vec<u32> = Vec::new();
            let mut max_channels: u16 = 0;

            for config in &configs {
                max_channels = max_channels.max(config.channels());

                for rate in [8000, 16000, 22050, 44100, 48000, 96000] {
                    if rate >= config.min_sample_rate().0
                        && rate <= config.max_sample_rate().0
                        && !sample_rates.contains(&rate)
                    {
                        sample_rates.push(rate);
                    }
                }
            }

            sample_rates.sort();

            all_devices.push(AudioInputDevice {
                id: DeviceId::with_host(&name, &host_name_str),
                name: name.clone(),
                host: host_name_str.clone(),
                is_default,
                sample_rates,
                max_channels,
            });
        }
    }

    all_devices
}

/// Get the default input device of the default host
pub(crate) fn get_default_input_device() -> EngineResult<cpal::Device> {
    cpal::default_host()
        .default_input_device()
        .ok_or_else(|| EngineError::NoDefaultDevice("no default input device".to_string()))
}

/// Find an input device by its configured identifier
pub(crate) fn find_input_device(id: &DeviceId) -> EngineResult<cpal::Device> {
    let host = match &id.host {
        Some(name) => get_host_by_name(name)
            .ok_or_else(|| EngineError::DeviceNotFound(id.display_label()))?,
        None => cpal::default_host(),
    };

    let devices = host
        .input_devices()
        .map_err(|e| EngineError::ConfigError(e.to_string()))?;

    for device in devices {
        if device.name().map(|n| n == id.name).unwrap_or(false) {
            return Ok(device);
        }
    }

    Err(EngineError::DeviceNotFound(id.display_label()))
}
