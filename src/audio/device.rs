//! Audio endpoint selection
//!
//! One default endpoint per channel role. A microphone channel opens the
//! default capture device; a loopback channel opens the default *render*
//! device for capture, which on WASAPI hosts yields the system's rendered
//! output (loopback mode).

use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;

use crate::audio::format::{NativeFormat, SampleFormat};
use crate::config::ChannelRole;
use crate::error::AudioError;

/// Wrapper around a cpal device bound to a channel role
pub struct Endpoint {
    inner: cpal::Device,
    pub name: String,
    pub role: ChannelRole,
}

impl Endpoint {
    /// Open the default endpoint for `role`.
    pub fn default_for_role(role: ChannelRole) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = match role {
            ChannelRole::Microphone => host.default_input_device().ok_or_else(|| {
                AudioError::DeviceNotFound("no default capture device".to_string())
            })?,
            ChannelRole::Loopback => host.default_output_device().ok_or_else(|| {
                AudioError::DeviceNotFound("no default render device for loopback".to_string())
            })?,
        };
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        Ok(Self {
            inner: device,
            name,
            role,
        })
    }

    pub fn inner(&self) -> &cpal::Device {
        &self.inner
    }

    /// The mix format the device reports for this role, not an assumed one.
    /// The normalizer handles whatever comes back; an unrepresentable
    /// sample type is rejected here.
    pub fn native_format(&self) -> Result<NativeFormat, AudioError> {
        let config = match self.role {
            ChannelRole::Microphone => self
                .inner
                .default_input_config()
                .map_err(|e| AudioError::StreamError(e.to_string()))?,
            // Loopback capture runs at the render side's mix format.
            ChannelRole::Loopback => self
                .inner
                .default_output_config()
                .map_err(|e| AudioError::StreamError(e.to_string()))?,
        };

        let sample_format = match config.sample_format() {
            cpal::SampleFormat::F32 => SampleFormat::F32,
            cpal::SampleFormat::I16 => SampleFormat::I16,
            other => {
                return Err(AudioError::UnsupportedFormat(format!(
                    "sample format {:?}",
                    other
                )))
            }
        };

        Ok(NativeFormat {
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
            sample_format,
        })
    }
}

/// Summary of an available device, for startup diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub name: String,
    pub is_input: bool,
    pub is_output: bool,
    pub is_default: bool,
}

/// List all available audio devices.
pub fn list_devices() -> Vec<DeviceInfo> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    let default_input_name = host.default_input_device().and_then(|d| d.name().ok());
    let default_output_name = host.default_output_device().and_then(|d| d.name().ok());

    if let Ok(inputs) = host.input_devices() {
        for device in inputs {
            if let Ok(name) = device.name() {
                let is_default = default_input_name.as_ref() == Some(&name);
                devices.push(DeviceInfo {
                    name,
                    is_input: true,
                    is_output: false,
                    is_default,
                });
            }
        }
    }

    if let Ok(outputs) = host.output_devices() {
        for device in outputs {
            if let Ok(name) = device.name() {
                let is_default = default_output_name.as_ref() == Some(&name);
                if let Some(existing) = devices.iter_mut().find(|d| d.name == name) {
                    existing.is_output = true;
                    existing.is_default |= is_default;
                } else {
                    devices.push(DeviceInfo {
                        name,
                        is_input: false,
                        is_output: true,
                        is_default,
                    });
                }
            }
        }
    }

    devices
}
