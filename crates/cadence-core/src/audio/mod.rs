//! Audio output for Cadence
//!
//! A single stereo CPAL stream pulls blocks from the [`PlaybackClock`]:
//!
//! ```text
//! ┌──────────────────┐  render()   ┌─────────────────────┐
//! │ CPAL audio thread│────────────►│   PlaybackClock     │◄── tick thread
//! │ (device callback)│             │ (mixer + timestamp) │    elapsed(), controls
//! └──────────────────┘             └─────────────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```ignore
//! use cadence_core::audio::{open_output, AudioConfig};
//! use cadence_core::engine::PlaybackClock;
//!
//! let output = open_output(&AudioConfig::default())?;
//! let clock = PlaybackClock::new(output.sample_rate());
//! let handle = output.start(clock.clone())?;
//! ```
//!
//! [`PlaybackClock`]: crate::engine::PlaybackClock

mod config;
mod cpal_backend;
mod device;
mod error;

pub use config::{AudioConfig, BufferSize, DeviceId, DEFAULT_BUFFER_SIZE};
pub use cpal_backend::{open_output, AudioHandle, AudioOutput};
pub use device::{find_device_by_id, get_default_device};
pub use error::{AudioError, AudioResult};
