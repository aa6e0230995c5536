//! Microphone capture feeding a waveform tap (feature `audio`)

use crate::source::TapWriter;
use crate::{AvatarError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use tracing::{info, warn};

/// A running input stream publishing mono samples into a [`TapWriter`]
///
/// Capture stops when this is dropped, which also closes the tap.
pub struct MicrophoneCapture {
    _stream: cpal::Stream,
    device_name: String,
    sample_rate: u32,
    channels: u16,
}

impl MicrophoneCapture {
    /// Open the default input device and start streaming into `writer`
    pub fn start(writer: TapWriter) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| AvatarError::AudioDevice("no default input device".to_string()))?;

        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".to_string());

        let default_config = device
            .default_input_config()
            .map_err(|e| AvatarError::AudioDevice(format!("no default input config: {e}")))?;
        let sample_format = default_config.sample_format();
        let sample_rate = default_config.sample_rate();
        let channels = default_config.channels();

        let stream_config = StreamConfig {
            channels,
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = build_stream(&device, &stream_config, sample_format, writer)?;
        stream
            .play()
            .map_err(|e| AvatarError::AudioDevice(format!("failed to start input stream: {e}")))?;

        info!(
            "Microphone capture started on '{}': {}Hz, {} channel(s), {:?}",
            device_name, sample_rate, channels, sample_format
        );

        Ok(Self {
            _stream: stream,
            device_name,
            sample_rate,
            channels,
        })
    }

    /// Name of the capturing device
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Native sample rate of the stream
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Native channel count of the stream
    pub fn channels(&self) -> u16 {
        self.channels
    }
}

fn build_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    format: SampleFormat,
    mut writer: TapWriter,
) -> Result<cpal::Stream> {
    let channels = config.channels as usize;
    let on_error = |err: cpal::StreamError| warn!("Audio input stream error: {err}");

    let stream = match format {
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                writer.push_interleaved(data, channels);
            },
            on_error,
            None,
        ),
        SampleFormat::I16 => {
            let mut scratch: Vec<f32> = Vec::new();
            device.build_input_stream(
                config,
                move |data: &[i16], _info: &cpal::InputCallbackInfo| {
                    scratch.clear();
                    scratch.extend(data.iter().map(|&s| s as f32 / i16::MAX as f32));
                    writer.push_interleaved(&scratch, channels);
                },
                on_error,
                None,
            )
        }
        other => {
            return Err(AvatarError::AudioDevice(format!(
                "unsupported sample format {other:?}"
            )))
        }
    };

    stream.map_err(|e| AvatarError::AudioDevice(format!("failed to build input stream: {e}")))
}
