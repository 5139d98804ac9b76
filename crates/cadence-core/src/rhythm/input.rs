//! Per-tick lane input
//!
//! `held` is the current button state; `press` holds only the buttons that
//! went down since the previous tick.

use bitflags::bitflags;

use crate::types::NUM_LANES;

bitflags! {
    /// Lane buttons
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Buttons: u8 {
        const LEFT = 1 << 0;
        const DOWN = 1 << 1;
        const UP = 1 << 2;
        const RIGHT = 1 << 3;
    }
}

impl Buttons {
    /// Button for a lane index (0-3)
    pub fn lane(lane: usize) -> Buttons {
        match lane {
            0 => Buttons::LEFT,
            1 => Buttons::DOWN,
            2 => Buttons::UP,
            3 => Buttons::RIGHT,
            _ => Buttons::empty(),
        }
    }
}

/// Input snapshot for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PadState {
    pub held: Buttons,
    pub press: Buttons,
}

impl PadState {
    pub fn new(held: Buttons, press: Buttons) -> Self {
        Self { held, press }
    }

    /// Derive edges from the previous and current held state
    pub fn from_transition(previous: Buttons, held: Buttons) -> Self {
        Self {
            held,
            press: held - previous,
        }
    }

    #[inline]
    pub fn pressed(&self, lane: usize) -> bool {
        lane < NUM_LANES && self.press.contains(Buttons::lane(lane))
    }

    #[inline]
    pub fn is_held(&self, lane: usize) -> bool {
        lane < NUM_LANES && self.held.contains(Buttons::lane(lane))
    }
}

/// Turns raw held state into per-tick [`PadState`] edges
#[derive(Debug, Clone, Copy, Default)]
pub struct PadTracker {
    previous: Buttons,
}

impl PadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, held: Buttons) -> PadState {
        let state = PadState::from_transition(self.previous, held);
        self.previous = held;
        state
    }
}
