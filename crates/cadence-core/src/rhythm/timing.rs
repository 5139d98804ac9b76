//! Tempo-derived timing constants
//!
//! Everything here is computed once per stage from the BPM and the scroll
//! speed, in fixed point:
//!
//! ```text
//! crochet          = bpm / 60                 beats per second
//! steps_per_second = crochet * 4
//! late_safe        = steps_per_second * 10 / 60   (steps)
//! early_safe       = late_safe / 2
//! note_speed       = 140 / steps_per_second * speed   (pixels per step)
//! tick_advance     = steps_per_second / ticks_per_second
//! ```

use crate::chart::POS_UNITS_PER_STEP;
use crate::fixed::Fixed;

/// Screen distance covered in one second of scroll, before the speed factor
const PIXELS_PER_SECOND: i32 = 140;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub bpm: Fixed,
    pub crochet: Fixed,
    pub steps_per_second: Fixed,
    pub late_safe: Fixed,
    pub early_safe: Fixed,
    pub note_speed: Fixed,
    /// Scroll advance per tick when not driven by audio
    pub tick_advance: Fixed,
}

impl Timing {
    /// Derive timing for a stage
    ///
    /// Returns None when the tempo is too slow to represent (the scroll would
    /// never advance between ticks) or the speed is negative.
    pub fn new(bpm: Fixed, speed: Fixed, ticks_per_second: u32) -> Option<Self> {
        if speed.is_negative() {
            return None;
        }
        let crochet = bpm.div(Fixed::from_int(60));
        let steps_per_second = crochet.mul_int(4);
        if steps_per_second <= Fixed::ZERO {
            return None;
        }
        let late_safe = steps_per_second.mul_int(10).div_int(60);
        let early_safe = Fixed::from_raw(late_safe.raw() >> 1);
        let note_speed = Fixed::from_int(PIXELS_PER_SECOND)
            .div(steps_per_second)
            .mul(speed);
        let tick_advance = steps_per_second.div_int(ticks_per_second.clamp(1, i32::MAX as u32) as i32);
        if tick_advance <= Fixed::ZERO {
            return None;
        }

        Some(Self {
            bpm,
            crochet,
            steps_per_second,
            late_safe,
            early_safe,
            note_speed,
            tick_advance,
        })
    }

    /// Chart position (1/24 step units) as a scroll coordinate
    #[inline]
    pub fn note_position(pos: u16) -> Fixed {
        Fixed::from_ratio(pos as i64, POS_UNITS_PER_STEP as i64)
    }

    /// Milliseconds of audio as fixed-point seconds
    #[inline]
    pub fn song_time(elapsed_ms: u64) -> Fixed {
        Fixed::from_ratio(elapsed_ms as i64, 1000)
    }

    /// Scroll position reached after `song_time` seconds
    #[inline]
    pub fn scroll_at(&self, song_time: Fixed) -> Fixed {
        song_time.mul(self.steps_per_second)
    }

    /// Vertical screen offset of a note relative to the strum line
    ///
    /// Negative values are above the line (already passed).
    #[inline]
    pub fn note_offset_px(&self, pos: u16, scroll: Fixed) -> Fixed {
        (Self::note_position(pos) - scroll).mul(self.note_speed)
    }

    /// Note is still ahead of the judgement window
    #[inline]
    pub fn is_early(&self, note: Fixed, scroll: Fixed) -> bool {
        note - self.early_safe > scroll
    }

    /// Note has fallen behind the judgement window
    #[inline]
    pub fn is_late(&self, note: Fixed, scroll: Fixed) -> bool {
        note + self.late_safe < scroll
    }
}
