//! Output device lookup and format interrogation

use cpal::traits::{DeviceTrait, HostTrait};

use crate::audio::format::StreamFormat;
use crate::error::AudioError;

/// Wrapper around the cpal output device
pub struct AudioDevice {
    inner: cpal::Device,
    pub name: String,
}

impl AudioDevice {
    pub fn from_cpal(device: cpal::Device) -> Self {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        Self {
            inner: device,
            name,
        }
    }

    pub fn inner(&self) -> &cpal::Device {
        &self.inner
    }

    /// Get supported output configurations
    pub fn supported_output_configs(
        &self,
    ) -> Result<Vec<cpal::SupportedStreamConfigRange>, AudioError> {
        self.inner
            .supported_output_configs()
            .map(|iter| iter.collect())
            .map_err(|e| AudioError::DeviceNotFound(e.to_string()))
    }

    /// Get default output config
    pub fn default_output_config(&self) -> Result<cpal::SupportedStreamConfig, AudioError> {
        self.inner
            .default_output_config()
            .map_err(|e| AudioError::DeviceNotFound(e.to_string()))
    }

    /// Whether the device advertises an i16 output configuration matching
    /// the requested sample rate and channel count
    ///
    /// A `false` here is a warning condition, not a failure: the requested
    /// format is still what gets sent to the device, and divergence shows up
    /// as wrong pitch rather than a refusal to play.
    pub fn supports(&self, format: &StreamFormat) -> bool {
        let rate = cpal::SampleRate(format.sample_rate);
        match self.inner.supported_output_configs() {
            Ok(configs) => configs.into_iter().any(|c| {
                c.channels() == format.channels
                    && c.sample_format() == cpal::SampleFormat::I16
                    && rate >= c.min_sample_rate()
                    && rate <= c.max_sample_rate()
            }),
            Err(_) => false,
        }
    }
}

/// Get the default output device
pub fn get_default_output_device() -> Result<AudioDevice, AudioError> {
    let host = cpal::default_host();
    host.default_output_device()
        .map(AudioDevice::from_cpal)
        .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string()))
}
