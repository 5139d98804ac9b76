//! Judgement output
//!
//! The engine queues these every tick for presentation collaborators (HUD,
//! character animation, camera, combo popups) to drain.

use super::judge::HitTier;
use crate::fixed::Fixed;

/// Camera focus target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    Player,
    Opponent,
}

/// Why a note was missed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissCause {
    /// Pressed with nothing in the window
    Press,
    /// Scrolled past the strum line unhit
    Swept,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgeEvent {
    /// A player press resolved a note
    Hit {
        lane: u8,
        tier: HitTier,
        /// scroll - note position, positive when late
        offset: Fixed,
        combo: u32,
    },
    /// A held lane resolved a sustain body
    SustainHit { lane: u8 },
    Miss { lane: u8, cause: MissCause },
    ComboChanged(u32),
    /// A miss reset a non-zero combo
    ComboBroken { was: u32 },
    HealthChanged { health: i32, delta: i32 },
    /// Per-lane strum flash restarted
    HitFlash { lane: u8 },
    CameraFocus(Focus),
    VocalChannel { active: bool },
    /// The opponent performed a note
    OpponentNote { lane: u8, alt: bool },
    /// The integer step advanced
    Step(i32),
}
