//! Playback clock bound to one stage's song

use std::sync::Arc;

use super::clock::{PlaybackClock, PlaybackError};
use crate::assets::{AssetSource, TrackSpec};
use crate::rhythm::SongTransport;
use crate::types::Channel;

/// The clock, the asset store and the stage's track, as the rhythm engine
/// drives them
pub struct StageTransport {
    clock: PlaybackClock,
    assets: Arc<dyn AssetSource>,
    track: TrackSpec,
}

impl StageTransport {
    pub fn new(clock: PlaybackClock, assets: Arc<dyn AssetSource>, track: TrackSpec) -> Self {
        Self {
            clock,
            assets,
            track,
        }
    }

    /// Decode the stage's track ahead of the pre-roll
    ///
    /// Starting the song afterwards only rewinds.
    pub fn prepare(&self) -> Result<(), PlaybackError> {
        self.clock.seek(self.assets.as_ref(), &self.track)
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn track(&self) -> &TrackSpec {
        &self.track
    }
}

impl SongTransport for StageTransport {
    fn start_song(&mut self) -> Result<(), PlaybackError> {
        self.clock
            .load_and_play(self.assets.as_ref(), &self.track, Channel::Primary, false)
    }

    fn is_playing(&self) -> bool {
        self.clock.is_playing()
    }

    fn elapsed_ms(&self) -> u64 {
        self.clock.elapsed_ms()
    }

    fn set_channel(&mut self, channel: Channel) {
        // A plain track has nothing in the second slot to fall back to
        if !self.track.vocal {
            return;
        }
        self.clock.set_active_channel(channel);
    }
}
