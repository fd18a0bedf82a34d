use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig, SupportedStreamConfig};
use thiserror::Error;

use crate::config::RecordingConfig;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("audio stream error: {0}")]
    Stream(String),
}

/// Handler invoked on the capture thread, once per complete frame
pub type FrameSink = Box<dyn FnMut(&[i16]) + Send>;

/// A raw frame pump: delivers fixed-size frames of signed 16-bit mono
/// samples, in capture order, to a registered sink. No filtering happens
/// here so the gate can be tested with synthetic frames and the capture
/// path can be swapped for a mock device.
pub trait FrameSource: Send {
    /// Start delivery. Fails with `DeviceUnavailable` if the device cannot
    /// be opened at the configured rate/format.
    fn open(&mut self, sink: FrameSink) -> Result<(), AudioError>;

    /// Stop delivery and release the device. Idempotent.
    fn close(&mut self);
}

/// Microphone-backed frame source built on cpal.
pub struct CaptureSource {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    frame_size: usize,
    stream: Option<Stream>,
}

// The stream handle is only ever touched from the thread that owns the
// session (open on start, drop on stop); cpal runs the callback on its own
// delivery thread regardless.
unsafe impl Send for CaptureSource {}

impl CaptureSource {
    pub fn new(recording: &RecordingConfig) -> Result<Self, AudioError> {
        let host = cpal::default_host();

        let device = match &recording.device {
            Some(name) => host
                .input_devices()
                .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?
                .find(|d| d.name().map(|n| n == *name).unwrap_or(false))
                .ok_or_else(|| {
                    AudioError::DeviceUnavailable(format!("input device '{}' not found", name))
                })?,
            None => host.default_input_device().ok_or_else(|| {
                AudioError::DeviceUnavailable("no input device available".to_string())
            })?,
        };

        let device_name = device
            .name()
            .unwrap_or_else(|_| "<unknown>".to_string());
        println!("Using audio input device: {}", device_name);

        let supported = device
            .supported_input_configs()
            .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;

        // Pick a config that covers the requested rate, preferring mono
        let mut selected: Option<SupportedStreamConfig> = None;
        for range in supported {
            if range.min_sample_rate().0 <= recording.sample_rate
                && range.max_sample_rate().0 >= recording.sample_rate
            {
                let candidate = range.with_sample_rate(cpal::SampleRate(recording.sample_rate));
                let prefer = match &selected {
                    None => true,
                    Some(current) => current.channels() != 1 && candidate.channels() == 1,
                };
                if prefer {
                    selected = Some(candidate);
                }
            }
        }

        let supported_config = selected.ok_or_else(|| {
            AudioError::DeviceUnavailable(format!(
                "device '{}' does not support {} Hz capture",
                device_name, recording.sample_rate
            ))
        })?;

        let sample_format = supported_config.sample_format();
        let config: StreamConfig = supported_config.into();

        println!(
            "Audio config: {} channels, {} Hz, {:?}",
            config.channels, config.sample_rate.0, sample_format
        );

        Ok(CaptureSource {
            device,
            config,
            sample_format,
            frame_size: recording.frame_size(),
            stream: None,
        })
    }
}

impl FrameSource for CaptureSource {
    fn open(&mut self, mut sink: FrameSink) -> Result<(), AudioError> {
        if self.stream.is_some() {
            return Ok(()); // already delivering
        }

        let channels = self.config.channels as usize;
        let frame_size = self.frame_size;
        // Carry buffer: cpal delivers whatever the device hands it, the sink
        // only ever sees exact frames
        let mut pending: Vec<i16> = Vec::with_capacity(frame_size * 2);

        let err_fn = |err| eprintln!("Audio stream error: {}", err);

        let stream = match self.sample_format {
            SampleFormat::I16 => self
                .device
                .build_input_stream(
                    &self.config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        downmix_into(&mut pending, data.iter().copied(), channels);
                        pump_frames(&mut pending, frame_size, &mut sink);
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?,
            SampleFormat::U16 => self
                .device
                .build_input_stream(
                    &self.config,
                    move |data: &[u16], _: &cpal::InputCallbackInfo| {
                        let converted = data.iter().map(|&s| (s as i32 - 32768) as i16);
                        downmix_into(&mut pending, converted, channels);
                        pump_frames(&mut pending, frame_size, &mut sink);
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?,
            SampleFormat::F32 => self
                .device
                .build_input_stream(
                    &self.config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let converted = data
                            .iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16);
                        downmix_into(&mut pending, converted, channels);
                        pump_frames(&mut pending, frame_size, &mut sink);
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?,
            format => {
                return Err(AudioError::DeviceUnavailable(format!(
                    "unsupported sample format: {:?}",
                    format
                )));
            }
        };

        stream
            .play()
            .map_err(|e| AudioError::Stream(e.to_string()))?;

        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
        }
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Append samples to the carry buffer, averaging interleaved channels to mono
fn downmix_into(pending: &mut Vec<i16>, samples: impl Iterator<Item = i16>, channels: usize) {
    if channels <= 1 {
        pending.extend(samples);
        return;
    }

    let mut acc = 0i32;
    let mut filled = 0usize;
    for sample in samples {
        acc += sample as i32;
        filled += 1;
        if filled == channels {
            pending.push((acc / channels as i32) as i16);
            acc = 0;
            filled = 0;
        }
    }
}

/// Hand complete frames to the sink, keeping any remainder staged
fn pump_frames(pending: &mut Vec<i16>, frame_size: usize, sink: &mut FrameSink) {
    while pending.len() >= frame_size {
        sink(&pending[..frame_size]);
        pending.drain(..frame_size);
    }
}
