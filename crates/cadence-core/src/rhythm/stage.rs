//! Stage data and judge tuning
//!
//! Plain configuration records: which track and chart a stage plays, its
//! tempo and scroll speed, and the scoring constants applied by the engine.

use serde::{Deserialize, Serialize};

use super::judge::NUM_TIERS;
use crate::assets::TrackSpec;
use crate::fixed::Fixed;

/// Chart difficulty tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(usize)]
pub enum Difficulty {
    Easy = 0,
    #[default]
    Normal = 1,
    Hard = 2,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Normal, Difficulty::Hard];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Letter used in chart asset names
    pub fn letter(self) -> char {
        match self {
            Difficulty::Easy => 'E',
            Difficulty::Normal => 'N',
            Difficulty::Hard => 'H',
        }
    }
}

/// Everything the engine needs to know about a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageDef {
    pub track: TrackSpec,
    pub bpm: Fixed,
    /// Scroll speed per difficulty (easy, normal, hard)
    pub speed: [Fixed; 3],
    pub week: u8,
    pub song: u8,
    /// Pre-roll length in steps before the song starts
    pub preroll_steps: u16,
    /// Distance above the strum line at which unhit notes are swept
    pub sweep_bound_px: u16,
}

impl Default for StageDef {
    fn default() -> Self {
        Self {
            track: TrackSpec::default(),
            bpm: Fixed::from_int(100),
            speed: [Fixed::ONE, Fixed::from_ratio(6, 5), Fixed::from_ratio(13, 10)],
            week: 1,
            song: 1,
            preroll_steps: 8,
            sweep_bound_px: 48,
        }
    }
}

impl StageDef {
    /// Chart asset name: `chart/<week>.<song><E|N|H>.cht`
    pub fn chart_asset_name(&self, difficulty: Difficulty) -> String {
        format!("chart/{}.{}{}.cht", self.week, self.song, difficulty.letter())
    }

    pub fn speed_for(&self, difficulty: Difficulty) -> Fixed {
        self.speed[difficulty.index()]
    }
}

/// Health and score constants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeTuning {
    pub start_health: i32,
    pub max_health: i32,
    pub hit_health: i32,
    pub sustain_health: i32,
    pub press_miss_penalty: i32,
    pub sweep_miss_penalty: i32,
    /// Ticks a strum flash lasts after a hit
    pub hit_flash_ticks: u8,
    /// Score per tier, best first
    pub tier_score: [u32; NUM_TIERS],
}

impl Default for JudgeTuning {
    fn default() -> Self {
        Self {
            start_health: 10000,
            max_health: 20000,
            hit_health: 230,
            sustain_health: 230,
            press_miss_penalty: 400,
            sweep_miss_penalty: 475,
            hit_flash_ticks: 6,
            tier_score: [350, 200, 100, 50],
        }
    }
}
