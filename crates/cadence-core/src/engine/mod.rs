//! Playback engine - decoded tracks, dual-slot mixer, clock
//!
//! - DecodedTrack: one fully decoded stereo buffer with a read cursor
//! - DualTrackMixer: vocal/instrumental slots advanced in lock-step
//! - PlaybackClock: shared play state and interpolated elapsed time
//! - StageTransport: the clock as seen by the rhythm engine

mod clock;
mod mixer;
mod track;
mod transport;

pub use clock::*;
pub use mixer::*;
pub use track::*;
pub use transport::*;
