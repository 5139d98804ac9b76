//! Output stream configuration
//!
//! Device selection, buffer size and sample rate preferences. Stored as
//! part of the player config file.

use serde::{Deserialize, Serialize};

/// Default buffer size when no preference is specified (frames)
///
/// 512 frames @ 48kHz is ~10.7ms, safe on most systems.
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Smallest buffer size accepted from config (frames)
pub const MIN_BUFFER_SIZE: u32 = 64;

/// Preferred buffer size for the output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Let the backend pick (DEFAULT_BUFFER_SIZE)
    #[default]
    Default,
    /// Request a specific buffer size in frames (clamped to a sane range)
    Fixed(u32),
    /// Smaller buffers for tighter input-to-audio latency
    LowLatency,
}

impl BufferSize {
    /// Buffer size in frames
    pub fn as_frames(&self) -> u32 {
        match self {
            BufferSize::Default => DEFAULT_BUFFER_SIZE,
            BufferSize::Fixed(frames) => {
                (*frames).clamp(MIN_BUFFER_SIZE, crate::types::MAX_BUFFER_SIZE as u32)
            }
            BufferSize::LowLatency => 256,
        }
    }

    /// One-way output latency in milliseconds at `sample_rate`
    pub fn latency_ms(&self, sample_rate: u32) -> f32 {
        (self.as_frames() as f32 / sample_rate as f32) * 1000.0
    }
}

/// Audio device identifier
///
/// The device name plus the host backend (ALSA, JACK, WASAPI, ...), so the
/// same name on two hosts can be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Host name; None searches every host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    /// Display label that includes the host if known
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Configuration for the output stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device (None = system default)
    pub device: Option<DeviceId>,

    pub buffer_size: BufferSize,

    /// Preferred sample rate (None = 48kHz if the device supports it)
    pub sample_rate: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_clamps() {
        assert_eq!(BufferSize::Default.as_frames(), DEFAULT_BUFFER_SIZE);
        assert_eq!(BufferSize::Fixed(16).as_frames(), MIN_BUFFER_SIZE);
        assert_eq!(BufferSize::Fixed(1 << 20).as_frames(), 8192);
        assert_eq!(BufferSize::Fixed(480).latency_ms(48000), 10.0);
    }

    #[test]
    fn test_device_label() {
        assert_eq!(DeviceId::new("hw:0,0").display_label(), "hw:0,0");
        let pinned = DeviceId {
            host: Some("ALSA".to_string()),
            ..DeviceId::new("hw:0,0")
        };
        assert_eq!(pinned.display_label(), "[ALSA] hw:0,0");
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: AudioConfig = serde_yaml::from_str("sample_rate: 44100\n").unwrap();
        assert_eq!(config.sample_rate, Some(44100));
        assert_eq!(config.buffer_size, BufferSize::Default);
        assert!(config.device.is_none());

        let config: AudioConfig =
            serde_yaml::from_str("buffer_size: !Fixed 128\ndevice:\n  name: pipewire\n").unwrap();
        assert_eq!(config.buffer_size, BufferSize::Fixed(128));
        assert_eq!(config.device, Some(DeviceId::new("pipewire")));
    }
}
