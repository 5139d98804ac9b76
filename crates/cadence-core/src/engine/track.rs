//! Decoded track buffer
//!
//! Owned by exactly one mixer slot. The cursor never leaves `[0, len]`;
//! once it reaches `len` the track is exhausted and further mix/skip calls
//! are no-ops.

use crate::types::StereoFrame;

/// Fully decoded stereo PCM with a read cursor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedTrack {
    frames: Vec<StereoFrame>,
    cursor: usize,
}

impl DecodedTrack {
    pub fn new(frames: Vec<StereoFrame>) -> Self {
        Self { frames, cursor: 0 }
    }

    /// Total frames
    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames consumed so far
    #[inline]
    pub fn position(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.frames.len() - self.cursor
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.frames.len()
    }

    pub fn frames(&self) -> &[StereoFrame] {
        &self.frames
    }

    /// Add frames from the cursor into `out`, advancing the cursor
    ///
    /// `out` is expected to be pre-cleared; existing content is summed with
    /// the track. Returns the number of frames mixed.
    pub fn mix_into(&mut self, out: &mut [StereoFrame]) -> usize {
        let count = out.len().min(self.remaining());
        let src = &self.frames[self.cursor..self.cursor + count];
        for (dst, &frame) in out.iter_mut().zip(src) {
            *dst += frame;
        }
        self.cursor += count;
        count
    }

    /// Advance the cursor without producing output
    ///
    /// Returns the number of frames skipped.
    pub fn skip(&mut self, frames: usize) -> usize {
        let count = frames.min(self.remaining());
        self.cursor += count;
        count
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}
