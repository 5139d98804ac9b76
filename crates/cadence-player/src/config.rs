//! Player configuration
//!
//! Stored as YAML in the user's config directory.
//! Default location: ~/.config/cadence/player.yaml

use std::path::PathBuf;

use cadence_core::audio::AudioConfig;
use cadence_core::config::{default_asset_root, default_config_path};
use cadence_core::rhythm::{Difficulty, JudgeTuning, StageDef};
use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Directory holding `music/` and `chart/`
    pub asset_root: PathBuf,
    pub audio: AudioConfig,
    pub stage: StageDef,
    pub difficulty: Difficulty,
    /// Game ticks per second
    pub ticks_per_second: u32,
    pub tuning: JudgeTuning,
    /// Let the built-in bot play; off means no input at all
    pub autoplay: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            asset_root: default_asset_root(),
            audio: AudioConfig::default(),
            stage: StageDef::default(),
            difficulty: Difficulty::default(),
            ticks_per_second: 60,
            tuning: JudgeTuning::default(),
            autoplay: true,
        }
    }
}

/// Default config file location
pub fn config_path() -> PathBuf {
    default_config_path("player.yaml")
}
