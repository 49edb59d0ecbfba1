//! Audio device enumeration and the cpal-backed [`AudioBackend`]

use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::audio::capture::CpalCapture;
use crate::audio::playback::CpalPlayback;
use crate::audio::{AudioBackend, CaptureSettings, PlaybackSettings, SegmentId};
use crate::error::AudioError;

/// Description of an audio endpoint
#[derive(Debug, Clone, Serialize)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub is_input: bool,
    pub is_output: bool,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}

/// List all available audio devices
pub fn list_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let mut devices: Vec<AudioDeviceInfo> = Vec::new();

    let default_input_name = host.default_input_device().and_then(|d| d.name().ok());
    let default_output_name = host.default_output_device().and_then(|d| d.name().ok());

    if let Ok(input_devices) = host.input_devices() {
        for device in input_devices {
            if let Ok(name) = device.name() {
                let (sample_rates, channels) = get_device_capabilities(&device, true);
                devices.push(AudioDeviceInfo {
                    is_default: default_input_name.as_ref() == Some(&name),
                    name,
                    is_input: true,
                    is_output: false,
                    sample_rates,
                    channels,
                });
            }
        }
    }

    if let Ok(output_devices) = host.output_devices() {
        for device in output_devices {
            if let Ok(name) = device.name() {
                let is_default = default_output_name.as_ref() == Some(&name);

                // Duplex devices show up once
                if let Some(existing) = devices.iter_mut().find(|d| d.name == name) {
                    existing.is_output = true;
                    existing.is_default |= is_default;
                    continue;
                }

                let (sample_rates, channels) = get_device_capabilities(&device, false);
                devices.push(AudioDeviceInfo {
                    name,
                    is_input: false,
                    is_output: true,
                    is_default,
                    sample_rates,
                    channels,
                });
            }
        }
    }

    devices
}

/// Get device capabilities
fn get_device_capabilities(device: &cpal::Device, is_input: bool) -> (Vec<u32>, Vec<u16>) {
    let configs: Vec<cpal::SupportedStreamConfigRange> = if is_input {
        device
            .supported_input_configs()
            .map(|c| c.collect())
            .unwrap_or_default()
    } else {
        device
            .supported_output_configs()
            .map(|c| c.collect())
            .unwrap_or_default()
    };

    let mut sample_rates = Vec::new();
    let mut channels = Vec::new();
    for config in configs {
        for rate_val in [16000u32, 24000, 44100, 48000, 96000] {
            let rate = cpal::SampleRate(rate_val);
            if rate >= config.min_sample_rate()
                && rate <= config.max_sample_rate()
                && !sample_rates.contains(&rate_val)
            {
                sample_rates.push(rate_val);
            }
        }
        if !channels.contains(&config.channels()) {
            channels.push(config.channels());
        }
    }

    sample_rates.sort_unstable();
    channels.sort_unstable();
    (sample_rates, channels)
}

/// Find an input device by name, or the default input
pub fn input_device(name: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    match name {
        None => host.default_input_device().ok_or_else(|| {
            AudioError::PermissionDenied("no default input device is available".to_string())
        }),
        Some(name) => find_by_name(host.input_devices(), name),
    }
}

/// Find an output device by name, or the default output
pub fn output_device(name: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string())),
        Some(name) => find_by_name(host.output_devices(), name),
    }
}

fn find_by_name<I>(devices: Result<I, cpal::DevicesError>, name: &str) -> Result<cpal::Device, AudioError>
where
    I: Iterator<Item = cpal::Device>,
{
    let devices = devices.map_err(|e| AudioError::DeviceNotFound(e.to_string()))?;
    for device in devices {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(device);
        }
    }
    Err(AudioError::DeviceNotFound(name.to_string()))
}

/// Classify a failure to open the microphone. Hosts report a refused or
/// busy device as "not available".
pub(crate) fn input_open_error(err: cpal::BuildStreamError) -> AudioError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => {
            AudioError::PermissionDenied("input device is not available".to_string())
        }
        cpal::BuildStreamError::StreamConfigNotSupported => {
            AudioError::UnsupportedFormat("input stream configuration".to_string())
        }
        other => AudioError::StreamError(other.to_string()),
    }
}

pub(crate) fn default_config_error(err: cpal::DefaultStreamConfigError, is_input: bool) -> AudioError {
    match (err, is_input) {
        (cpal::DefaultStreamConfigError::DeviceNotAvailable, true) => {
            AudioError::PermissionDenied("input device is not available".to_string())
        }
        (other, _) => AudioError::StreamError(other.to_string()),
    }
}

/// Real audio hardware through cpal
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl AudioBackend for CpalBackend {
    type Input = CpalCapture;
    type Output = CpalPlayback;

    fn open_input(&self, settings: &CaptureSettings) -> Result<CpalCapture, AudioError> {
        CpalCapture::open(settings.clone())
    }

    fn open_output(
        &self,
        settings: &PlaybackSettings,
        finished: UnboundedSender<SegmentId>,
    ) -> Result<CpalPlayback, AudioError> {
        CpalPlayback::open(settings.clone(), finished)
    }
}
