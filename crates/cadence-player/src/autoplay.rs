//! Autoplay input
//!
//! Taps every player note as the scroll reaches it and holds through
//! sustain bodies. Reads the chart and scroll from the engine; never
//! touches judgement state.

use cadence_core::rhythm::{Buttons, PadState, RhythmEngine, Timing};

#[derive(Debug, Default)]
pub struct Autoplay {
    previous: Buttons,
}

impl Autoplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Input for the next tick
    pub fn next_input(&mut self, engine: &RhythmEngine) -> PadState {
        let timing = engine.timing();
        // Where the scroll will be once the tick has advanced it
        let scroll = engine.scroll() + timing.tick_advance;

        let mut tap = Buttons::empty();
        let mut sustain = Buttons::empty();
        for note in engine.chart().notes().iter().skip(engine.note_cursor()) {
            let pos = Timing::note_position(note.pos);
            if timing.is_early(pos, scroll) {
                break;
            }
            if note.is_hit() || note.is_opponent() || timing.is_late(pos, scroll) {
                continue;
            }
            let button = Buttons::lane(note.lane as usize);
            if note.is_sustain() {
                // Stay down while any body is inside the window
                sustain |= button;
            } else if pos <= scroll {
                tap |= button;
            }
        }

        // A tap needs a fresh edge; let go for one tick if the lane is down
        let retrigger = tap & self.previous;
        let held = (tap | sustain) - retrigger;

        let pad = PadState::from_transition(self.previous, held);
        self.previous = held;
        pad
    }
}
