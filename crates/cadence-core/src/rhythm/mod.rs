//! Rhythm game core - timing, judgement and the per-tick engine
//!
//! - Timing: tempo-derived constants in fixed point
//! - Judge: hit tier classification
//! - RhythmEngine: scroll, input judgement, opponent notes, health
//!
//! The engine never touches audio directly; it drives a [`SongTransport`].

mod event;
mod input;
mod judge;
mod session;
mod stage;
mod timing;

pub use event::*;
pub use input::*;
pub use judge::*;
pub use session::*;
pub use stage::*;
pub use timing::*;
