//! Dual-track mixer
//!
//! Two slots, each holding at most one decoded track. Every mix pass adds
//! the active slot into the output and skips the inactive slot by the same
//! frame count, so both cursors stay in lock-step and a channel swap resumes
//! the formerly silent track in sync.

use super::track::DecodedTrack;
use crate::types::{Channel, StereoFrame, NUM_SLOTS};

/// Slot contents handed in and out of the mixer as a unit
pub type SlotPair = [Option<DecodedTrack>; NUM_SLOTS];

#[derive(Debug, Default)]
pub struct DualTrackMixer {
    slots: SlotPair,
}

impl DualTrackMixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mix one pass
    ///
    /// Adds up to `out.len()` frames from the active slot into `out` and
    /// advances the inactive slot by `out.len()` frames. Returns frames mixed
    /// from the active slot.
    pub fn mix_into(&mut self, out: &mut [StereoFrame], active: Channel) -> usize {
        let frames = out.len();
        let [primary, secondary] = &mut self.slots;
        let (audible, silent) = match active {
            Channel::Primary => (primary, secondary),
            Channel::Secondary => (secondary, primary),
        };

        let mixed = audible.as_mut().map_or(0, |track| track.mix_into(out));
        if let Some(track) = silent.as_mut() {
            track.skip(frames);
        }
        mixed
    }

    /// Frames consumed by the given slot
    ///
    /// Falls back to the other slot when this one is empty; both advance
    /// together, so either is a valid playback position.
    pub fn consumed(&self, channel: Channel) -> usize {
        self.slots[channel.index()]
            .as_ref()
            .or(self.slots[channel.other().index()].as_ref())
            .map_or(0, DecodedTrack::position)
    }

    /// True when no slot has frames left (empty slots count as exhausted)
    pub fn all_exhausted(&self) -> bool {
        self.slots
            .iter()
            .all(|slot| slot.as_ref().map_or(true, DecodedTrack::is_exhausted))
    }

    pub fn rewind_all(&mut self) {
        for track in self.slots.iter_mut().flatten() {
            track.rewind();
        }
    }

    /// Swap in new slot contents, returning the previous ones
    ///
    /// The caller drops the returned buffers outside any lock.
    pub fn replace(&mut self, slots: SlotPair) -> SlotPair {
        std::mem::replace(&mut self.slots, slots)
    }

    /// Take both buffers out, leaving the mixer empty
    pub fn take(&mut self) -> SlotPair {
        self.replace([None, None])
    }

    /// Cursor position of each slot (None for empty slots)
    pub fn positions(&self) -> [Option<usize>; NUM_SLOTS] {
        [
            self.slots[0].as_ref().map(DecodedTrack::position),
            self.slots[1].as_ref().map(DecodedTrack::position),
        ]
    }
}
