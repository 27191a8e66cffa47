//! Output device and PCM format negotiation.
//!
//! Runs once on the control thread before the audio thread starts; never
//! concurrently with an active render loop.

use crate::config::{EngineDesc, OutputDevice, OUTPUT_CHANNELS};
use crate::error::{Result, SoundfieldError};
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, StreamConfig};

/// The resolved device and stream format handed to the output driver.
pub(crate) struct NegotiatedOutput {
    pub device: cpal::Device,
    pub device_name: String,
    pub config: StreamConfig,
    pub sample_format: SampleFormat,
}

/// Resolve the requested output device and a PCM format supported by both
/// the device and the renderer (stereo at the engine's sample rate).
pub(crate) fn negotiate(desc: &EngineDesc) -> Result<NegotiatedOutput> {
    let host = cpal::default_host();

    let device = match &desc.device {
        OutputDevice::Default => host.default_output_device().ok_or_else(|| {
            SoundfieldError::DeviceUnavailable("no default output device".into())
        })?,
        OutputDevice::Named(name) => {
            let mut devices = host.output_devices().map_err(|e| {
                SoundfieldError::DeviceUnavailable(format!("device enumeration failed: {e}"))
            })?;
            devices
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                .ok_or_else(|| {
                    SoundfieldError::DeviceUnavailable(format!("no output device named \"{name}\""))
                })?
        }
    };
    let device_name = device.name().unwrap_or_else(|_| "<unknown>".into());

    let supported = device.supported_output_configs().map_err(|e| {
        SoundfieldError::FormatUnsupported(format!(
            "cannot query formats of \"{device_name}\": {e}"
        ))
    })?;

    let sample_rate = desc.sample_rate;
    let mut sample_format = None;
    for range in supported {
        if range.channels() as usize != OUTPUT_CHANNELS {
            continue;
        }
        if range.min_sample_rate().0 > sample_rate || range.max_sample_rate().0 < sample_rate {
            continue;
        }
        // The render pipeline produces f32; the sink callback converts to
        // whatever the device speaks, so any of these formats work.
        match range.sample_format() {
            SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16 => {
                sample_format = Some(range.sample_format());
                // Prefer f32, keep looking if we found an integer format.
                if range.sample_format() == SampleFormat::F32 {
                    break;
                }
            }
            _ => continue,
        }
    }

    let sample_format = sample_format.ok_or_else(|| {
        SoundfieldError::FormatUnsupported(format!(
            "\"{device_name}\" supports no stereo format at {sample_rate} Hz"
        ))
    })?;

    log::info!(
        "negotiated output: \"{device_name}\", {OUTPUT_CHANNELS} ch, {sample_rate} Hz, {sample_format:?}"
    );

    Ok(NegotiatedOutput {
        device,
        device_name,
        config: StreamConfig {
            channels: OUTPUT_CHANNELS as u16,
            sample_rate: SampleRate(sample_rate),
            buffer_size: BufferSize::Default,
        },
        sample_format,
    })
}
