//! CPAL output stream
//!
//! Opening and starting are separate steps: the device's negotiated sample
//! rate is needed to build the [`PlaybackClock`] (tracks are decoded at that
//! rate), and the clock is needed to start the stream.
//!
//! The callback renders into a scratch buffer allocated once at
//! MAX_BUFFER_SIZE frames; larger device requests are processed in chunks.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use super::config::AudioConfig;
use super::device::{find_device_by_id, get_default_device};
use super::error::{AudioError, AudioResult};
use crate::engine::PlaybackClock;
use crate::types::{StereoFrame, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE};

/// An opened, not yet running output device
pub struct AudioOutput {
    device: cpal::Device,
    device_name: String,
    stream_config: StreamConfig,
    sample_format: SampleFormat,
    buffer_size: u32,
}

/// Keeps the output stream alive. Drop this to stop audio.
pub struct AudioHandle {
    _stream: Stream,
    sample_rate: u32,
    buffer_size: u32,
}

impl AudioHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Buffer size in frames as requested from the device
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// One-way output latency in milliseconds
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }
}

/// Open the configured (or default) output device and negotiate a format
pub fn open_output(config: &AudioConfig) -> AudioResult<AudioOutput> {
    let device = match &config.device {
        Some(id) => find_device_by_id(id)?,
        None => get_default_device()?,
    };
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio device: {}", device_name);

    let (supported, buffer_size) = get_output_config(&device, config)?;
    let stream_config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };

    log::info!(
        "Audio config: {} channels, {}Hz, {:?}, {} frames (~{:.1}ms latency)",
        stream_config.channels,
        stream_config.sample_rate.0,
        supported.sample_format(),
        buffer_size,
        (buffer_size as f32 / stream_config.sample_rate.0 as f32) * 1000.0
    );

    Ok(AudioOutput {
        device,
        device_name,
        stream_config,
        sample_format: supported.sample_format(),
        buffer_size,
    })
}

impl AudioOutput {
    /// Negotiated sample rate; decode tracks at this rate
    pub fn sample_rate(&self) -> u32 {
        self.stream_config.sample_rate.0
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Build the stream around `clock` and start it
    pub fn start(self, clock: PlaybackClock) -> AudioResult<AudioHandle> {
        if clock.sample_rate() != self.sample_rate() {
            log::warn!(
                "Clock runs at {}Hz but the device at {}Hz",
                clock.sample_rate(),
                self.sample_rate()
            );
        }

        let stream = match self.sample_format {
            SampleFormat::F32 => {
                build_output_stream(&self.device, &self.stream_config, clock, |s: i16| {
                    s as f32 / 32768.0
                })?
            }
            SampleFormat::I16 => {
                build_output_stream(&self.device, &self.stream_config, clock, |s: i16| s)?
            }
            SampleFormat::U16 => {
                build_output_stream(&self.device, &self.stream_config, clock, |s: i16| {
                    (s as i32 + 32768) as u16
                })?
            }
            other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
        };

        stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;
        log::info!("Audio stream started on {}", self.device_name);

        Ok(AudioHandle {
            _stream: stream,
            sample_rate: self.sample_rate(),
            buffer_size: self.buffer_size,
        })
    }
}

/// Pick the best output configuration for a device
///
/// Prefers f32 stereo at the requested rate (48kHz by default). Returns
/// (config, buffer size in frames).
fn get_output_config(
    device: &cpal::Device,
    config: &AudioConfig,
) -> AudioResult<(cpal::SupportedStreamConfig, u32)> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    if supported_configs.is_empty() {
        return Err(AudioError::ConfigError(
            "No supported output configurations".to_string(),
        ));
    }

    let target_sample_rate = config.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
    let supports_rate = |c: &cpal::SupportedStreamConfigRange| {
        (c.min_sample_rate().0..=c.max_sample_rate().0).contains(&target_sample_rate)
    };

    let best_config = supported_configs
        .iter()
        .find(|c| c.sample_format() == SampleFormat::F32 && c.channels() >= 2 && supports_rate(c))
        .or_else(|| {
            supported_configs
                .iter()
                .find(|c| c.channels() >= 2 && supports_rate(c))
        })
        .or_else(|| supported_configs.iter().find(|c| c.channels() >= 2))
        .or_else(|| supported_configs.first())
        .ok_or_else(|| {
            AudioError::ConfigError("No suitable output configuration found".to_string())
        })?;

    let sample_rate = if supports_rate(best_config) {
        cpal::SampleRate(target_sample_rate)
    } else {
        let fallback = best_config.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz (tracks will be resampled)",
            target_sample_rate,
            fallback.0
        );
        fallback
    };

    let stream_config = best_config.clone().with_sample_rate(sample_rate);
    let buffer_size = config.buffer_size.as_frames();
    log::debug!(
        "Selected buffer size: {} frames for {:?}",
        buffer_size,
        config.buffer_size
    );

    Ok((stream_config, buffer_size))
}

fn build_output_stream<T, F>(
    device: &cpal::Device,
    config: &StreamConfig,
    clock: PlaybackClock,
    convert: F,
) -> AudioResult<Stream>
where
    T: cpal::SizedSample + Send + 'static,
    F: Fn(i16) -> T + Send + 'static,
{
    let channels = config.channels as usize;
    let silence = convert(0);
    let mut scratch = vec![StereoFrame::silence(); MAX_BUFFER_SIZE];

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _info: &cpal::OutputCallbackInfo| {
                for block in data.chunks_mut(MAX_BUFFER_SIZE * channels) {
                    let frames = block.len() / channels;
                    let mixed = &mut scratch[..frames];
                    mixed.fill(StereoFrame::silence());
                    clock.render(mixed);
                    write_frames(block, channels, mixed, &convert, silence);
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

/// Interleave stereo frames into a device buffer with any channel count
///
/// Mono devices get the average of both sides; channels past the second
/// are silent.
fn write_frames<T: Copy>(
    out: &mut [T],
    channels: usize,
    frames: &[StereoFrame],
    convert: &impl Fn(i16) -> T,
    silence: T,
) {
    for (frame, sample) in out.chunks_mut(channels).zip(frames) {
        match frame {
            [mono] => *mono = convert(((sample.left as i32 + sample.right as i32) / 2) as i16),
            [left, right, rest @ ..] => {
                *left = convert(sample.left);
                *right = convert(sample.right);
                rest.fill(silence);
            }
            [] => {}
        }
    }
}
