//! Hit tier classification
//!
//! A pure function of the absolute timing offset and the late-safe window:
//! beyond 90% of the window is `Shit`, beyond 75% `Bad`, beyond 20% `Good`,
//! anything tighter `Sick`. Offsets outside the window don't match at all.

use serde::{Deserialize, Serialize};

use crate::fixed::Fixed;

pub const NUM_TIERS: usize = 4;

/// Judgement quality of a hit, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(usize)]
pub enum HitTier {
    Sick = 0,
    Good = 1,
    Bad = 2,
    Shit = 3,
}

impl HitTier {
    pub const ALL: [HitTier; NUM_TIERS] = [HitTier::Sick, HitTier::Good, HitTier::Bad, HitTier::Shit];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(&self) -> &'static str {
        match self {
            HitTier::Sick => "Sick",
            HitTier::Good => "Good",
            HitTier::Bad => "Bad",
            HitTier::Shit => "Shit",
        }
    }
}

impl std::fmt::Display for HitTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Classify a hit offset (either sign) against the late-safe window
pub fn classify(offset: Fixed, late_safe: Fixed) -> Option<HitTier> {
    let offset = offset.abs();
    if offset > late_safe {
        None
    } else if offset > late_safe.mul_int(9).div_int(10) {
        Some(HitTier::Shit)
    } else if offset > late_safe.mul_int(3).div_int(4) {
        Some(HitTier::Bad)
    } else if offset > late_safe.div_int(5) {
        Some(HitTier::Good)
    } else {
        Some(HitTier::Sick)
    }
}
