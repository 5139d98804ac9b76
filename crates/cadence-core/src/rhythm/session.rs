//! Rhythm tick engine
//!
//! Once per game frame the engine turns the song clock into a fixed-point
//! scroll position and judges input against the chart.
//!
//! # Phases
//!
//! ```text
//! PreRoll ──scroll reaches 0──► Live ──audio stops──► Ended
//!  scroll += tick_advance       scroll = f(elapsed)   scroll += tick_advance
//!                               (never rewinds)
//! ```
//!
//! # Per tick
//!
//! 1. Advance the scroll for the current phase
//! 2. Track the integer step, the beat pulse and the section cursor
//! 3. While audible: judge fresh presses, then held lanes (sustains)
//! 4. Auto-resolve opponent notes the scroll has reached
//! 5. Sweep unhit notes that scrolled off the top as misses
//! 6. Clamp health; zero or below ends the session
//!
//! Both cursors (section and note) only move forward, so a tick costs
//! amortized O(1) plus the notes inside the judgement window.

use thiserror::Error;

use super::event::{Focus, JudgeEvent, MissCause};
use super::input::PadState;
use super::judge::{classify, HitTier};
use super::stage::{Difficulty, JudgeTuning, StageDef};
use super::timing::Timing;
use crate::assets::{AssetError, AssetSource};
use crate::chart::{Chart, ChartError, Section, POS_UNITS_PER_STEP};
use crate::engine::PlaybackError;
use crate::fixed::Fixed;
use crate::types::{Channel, NUM_LANES};

/// Song playback as seen by the tick engine
pub trait SongTransport {
    /// Start the song from the top
    fn start_song(&mut self) -> Result<(), PlaybackError>;

    fn is_playing(&self) -> bool;

    /// Interpolated playback position in milliseconds
    fn elapsed_ms(&self) -> u64;

    /// Select the audible mix slot (vocal or instrumental)
    fn set_channel(&mut self, channel: Channel);
}

/// Conditions that end a session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("Invalid chart: {0}")]
    Chart(#[from] ChartError),

    #[error("Failed to start song: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Stage tempo out of range: {bpm} bpm at speed {speed}")]
    InvalidStage { bpm: Fixed, speed: Fixed },

    /// The player lost; not a crash, but the session cannot continue
    #[error("Health depleted at step {step}")]
    HealthDepleted { step: i32, health: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    PreRoll,
    Live,
    Ended,
}

/// Zoom pulse for the HUD (1.0 when idle)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    /// Every 16 steps
    pub bump: Fixed,
    /// Every 4 steps
    pub sbump: Fixed,
}

impl Default for Pulse {
    fn default() -> Self {
        Self {
            bump: Fixed::ONE,
            sbump: Fixed::ONE,
        }
    }
}

pub struct RhythmEngine {
    chart: Chart,
    timing: Timing,
    tuning: JudgeTuning,
    sweep_bound: Fixed,

    phase: SessionPhase,
    scroll: Fixed,
    song_step: i32,
    just_step: bool,
    audible: bool,
    section: usize,
    note_cursor: usize,

    hit_flash: [u8; NUM_LANES],
    /// Lane has been held since it last resolved a note
    holding: [bool; NUM_LANES],
    health: i32,
    score: u32,
    combo: u32,
    max_combo: u32,
    vocal_active: bool,
    focus: Focus,
    pulse: Pulse,

    /// Output of the most recent tick
    events: Vec<JudgeEvent>,
}

impl RhythmEngine {
    pub fn new(
        chart: Chart,
        stage: &StageDef,
        difficulty: Difficulty,
        tuning: JudgeTuning,
        ticks_per_second: u32,
    ) -> Result<Self, SessionError> {
        let speed = stage.speed_for(difficulty);
        let timing = Timing::new(stage.bpm, speed, ticks_per_second).ok_or(
            SessionError::InvalidStage {
                bpm: stage.bpm,
                speed,
            },
        )?;
        let focus = focus_of(&chart.sections()[0]);
        let health = tuning.start_health;

        log::info!(
            "Stage {}.{} {:?}: {} bpm, {} notes, late window {} steps",
            stage.week,
            stage.song,
            difficulty,
            stage.bpm,
            chart.notes().len(),
            timing.late_safe
        );

        Ok(Self {
            chart,
            timing,
            tuning,
            sweep_bound: Fixed::from_int(stage.sweep_bound_px as i32),
            phase: SessionPhase::PreRoll,
            scroll: -Fixed::from_int(stage.preroll_steps as i32),
            song_step: 0,
            just_step: false,
            audible: false,
            section: 0,
            note_cursor: 0,
            hit_flash: [0; NUM_LANES],
            holding: [false; NUM_LANES],
            health,
            score: 0,
            combo: 0,
            max_combo: 0,
            vocal_active: true,
            focus,
            pulse: Pulse::default(),
            events: vec![JudgeEvent::CameraFocus(focus)],
        })
    }

    /// Read and parse the stage's chart, then build the engine
    pub fn load(
        assets: &dyn AssetSource,
        stage: &StageDef,
        difficulty: Difficulty,
        tuning: JudgeTuning,
        ticks_per_second: u32,
    ) -> Result<Self, SessionError> {
        let name = stage.chart_asset_name(difficulty);
        let chart = Chart::parse(&assets.read(&name)?)?;
        log::info!("Loaded chart {}", name);
        Self::new(chart, stage, difficulty, tuning, ticks_per_second)
    }

    /// Advance one game frame
    ///
    /// Events produced by this tick replace the previous tick's events.
    pub fn tick<T>(&mut self, transport: &mut T, pad: &PadState) -> Result<(), SessionError>
    where
        T: SongTransport + ?Sized,
    {
        self.events.clear();
        let health_before = self.health;

        for flash in self.hit_flash.iter_mut() {
            *flash = flash.saturating_sub(1);
        }

        let (next_step, audible) = self.advance_scroll(transport)?;
        self.audible = audible;

        self.just_step = next_step > self.song_step;
        self.song_step = next_step;
        if self.just_step {
            self.events.push(JudgeEvent::Step(next_step));
        }

        self.update_pulse();
        self.advance_section();

        if audible {
            for lane in 0..NUM_LANES {
                if pad.pressed(lane) {
                    self.press(transport, lane);
                }
            }
            for lane in 0..NUM_LANES {
                if pad.is_held(lane) {
                    self.hold(transport, lane);
                }
            }
        }
        for lane in 0..NUM_LANES {
            if !pad.is_held(lane) {
                self.holding[lane] = false;
            }
        }

        self.resolve_opponent_notes(transport);
        self.sweep(transport);

        self.check_health(health_before)
    }

    /// Returns (integer step, whether audio is audibly playing)
    fn advance_scroll<T>(&mut self, transport: &mut T) -> Result<(i32, bool), SessionError>
    where
        T: SongTransport + ?Sized,
    {
        match self.phase {
            SessionPhase::PreRoll => {
                let next = self.scroll + self.timing.tick_advance;
                if next >= Fixed::ZERO {
                    transport.start_song()?;
                    self.scroll = Fixed::ZERO;
                    self.phase = SessionPhase::Live;
                    log::debug!("Pre-roll done, song started");
                } else {
                    self.scroll = next;
                }
                Ok((0, false))
            }
            SessionPhase::Live if transport.is_playing() => {
                let song_time = Timing::song_time(transport.elapsed_ms());
                if song_time <= Fixed::ZERO {
                    // Started but not yet audible
                    return Ok((self.scroll.floor(), false));
                }
                let next = self.timing.scroll_at(song_time);
                if next > self.scroll {
                    self.scroll = next;
                }
                Ok((self.scroll.floor(), true))
            }
            SessionPhase::Live | SessionPhase::Ended => {
                if self.phase == SessionPhase::Live {
                    self.phase = SessionPhase::Ended;
                    log::debug!("Song ended at step {}", self.song_step);
                }
                self.scroll += self.timing.tick_advance;
                Ok((self.scroll.floor(), false))
            }
        }
    }

    fn update_pulse(&mut self) {
        if !self.audible {
            self.pulse = Pulse::default();
            return;
        }
        let lead = Fixed::from_ratio(75, 100) - self.scroll.frac();
        self.pulse.bump = if self.song_step & 0xF == 0 {
            Fixed::ONE + lead.div_int(16)
        } else {
            Fixed::ONE
        };
        self.pulse.sbump = if self.song_step & 0x3 == 0 {
            Fixed::ONE + lead.div_int(24)
        } else {
            Fixed::ONE
        };
    }

    fn advance_section(&mut self) {
        let sections = self.chart.sections();
        while self.section + 1 < sections.len()
            && self.song_step >= sections[self.section].end as i32
        {
            self.section += 1;
            let focus = focus_of(&sections[self.section]);
            self.focus = focus;
            self.events.push(JudgeEvent::CameraFocus(focus));
            log::debug!("Section {} at step {} ({:?})", self.section, self.song_step, focus);
        }
    }

    /// Fresh press on a lane: resolve the earliest matching note in the window
    fn press<T>(&mut self, transport: &mut T, lane: usize)
    where
        T: SongTransport + ?Sized,
    {
        let mut found: Option<(usize, HitTier, Fixed)> = None;
        for (index, note) in self.chart.notes().iter().enumerate().skip(self.note_cursor) {
            let pos = Timing::note_position(note.pos);
            if self.timing.is_early(pos, self.scroll) {
                break;
            }
            if self.timing.is_late(pos, self.scroll)
                || note.is_hit()
                || note.lane as usize != lane
                || note.is_opponent()
                || note.is_sustain()
            {
                continue;
            }
            let offset = self.scroll - pos;
            if let Some(tier) = classify(offset, self.timing.late_safe) {
                found = Some((index, tier, offset));
                break;
            }
        }

        let Some((index, tier, offset)) = found else {
            self.miss(lane, MissCause::Press);
            self.health -= self.tuning.press_miss_penalty;
            return;
        };

        self.chart.mark_hit(index);
        self.combo += 1;
        self.max_combo = self.max_combo.max(self.combo);
        self.score += self.tuning.tier_score[tier.index()];
        self.holding[lane] = true;
        self.events.push(JudgeEvent::Hit {
            lane: lane as u8,
            tier,
            offset,
            combo: self.combo,
        });
        self.events.push(JudgeEvent::ComboChanged(self.combo));

        self.start_vocal(transport);
        self.health += self.tuning.hit_health;
        self.flash(lane);
    }

    /// Held lane: resolve one sustain body in the window
    ///
    /// A body is a judged hit, but the combo only counts the hold once: when
    /// it starts, either from a pressed head or from the first body reached
    /// with the lane already down. Later bodies of the same hold add health
    /// and flash without touching the combo.
    fn hold<T>(&mut self, transport: &mut T, lane: usize)
    where
        T: SongTransport + ?Sized,
    {
        if self.hit_flash[lane] == 0 {
            self.hit_flash[lane] = 1;
        }

        let mut found = None;
        for (index, note) in self.chart.notes().iter().enumerate().skip(self.note_cursor) {
            let pos = Timing::note_position(note.pos);
            if self.timing.is_early(pos, self.scroll) {
                break;
            }
            if self.timing.is_late(pos, self.scroll)
                || note.lane as usize != lane
                || note.is_opponent()
                || note.is_hit()
                || !note.is_sustain()
            {
                continue;
            }
            found = Some(index);
            break;
        }

        let Some(index) = found else { return };

        self.chart.mark_hit(index);
        // Only entering a hold counts toward the combo
        if !self.holding[lane] {
            self.holding[lane] = true;
            self.combo += 1;
            self.max_combo = self.max_combo.max(self.combo);
            self.events.push(JudgeEvent::ComboChanged(self.combo));
        }
        self.events.push(JudgeEvent::SustainHit { lane: lane as u8 });

        self.start_vocal(transport);
        self.health += self.tuning.sustain_health;
        self.flash(lane);
    }

    /// Opponent notes up to the current scroll play themselves
    fn resolve_opponent_notes<T>(&mut self, transport: &mut T)
    where
        T: SongTransport + ?Sized,
    {
        let limit = self.scroll.mul_int(POS_UNITS_PER_STEP).floor();
        let alt = self.current_section().alt_anim();

        let mut index = self.note_cursor;
        while let Some(&note) = self.chart.note(index) {
            if note.pos as i32 > limit {
                break;
            }
            if self.audible && note.is_opponent() && !note.is_hit() {
                self.start_vocal(transport);
                self.chart.mark_hit(index);
                self.events.push(JudgeEvent::OpponentNote {
                    lane: note.lane,
                    alt,
                });
            }
            index += 1;
        }
    }

    /// Move the note cursor past notes that left the screen
    fn sweep<T>(&mut self, transport: &mut T)
    where
        T: SongTransport + ?Sized,
    {
        while let Some(&note) = self.chart.note(self.note_cursor) {
            let pos = Timing::note_position(note.pos);
            let offscreen = self.timing.note_offset_px(note.pos, self.scroll) < -self.sweep_bound;
            if !offscreen || !self.timing.is_late(pos, self.scroll) {
                break;
            }
            if !note.is_opponent() && !note.is_hit() {
                self.cut_vocal(transport);
                self.miss(note.lane as usize, MissCause::Swept);
                self.health -= self.tuning.sweep_miss_penalty;
            }
            self.note_cursor += 1;
        }
    }

    fn check_health(&mut self, health_before: i32) -> Result<(), SessionError> {
        if self.health > 0 {
            self.health = self.health.min(self.tuning.max_health);
        }
        if self.health != health_before {
            self.events.push(JudgeEvent::HealthChanged {
                health: self.health,
                delta: self.health - health_before,
            });
        }
        if self.health <= 0 {
            log::info!("Health depleted at step {}", self.song_step);
            return Err(SessionError::HealthDepleted {
                step: self.song_step,
                health: self.health,
            });
        }
        Ok(())
    }

    fn miss(&mut self, lane: usize, cause: MissCause) {
        self.events.push(JudgeEvent::Miss {
            lane: lane as u8,
            cause,
        });
        if self.combo > 0 {
            self.events.push(JudgeEvent::ComboBroken { was: self.combo });
            self.combo = 0;
            self.events.push(JudgeEvent::ComboChanged(0));
        }
    }

    fn flash(&mut self, lane: usize) {
        self.hit_flash[lane] = self.tuning.hit_flash_ticks;
        self.events.push(JudgeEvent::HitFlash { lane: lane as u8 });
    }

    fn start_vocal<T>(&mut self, transport: &mut T)
    where
        T: SongTransport + ?Sized,
    {
        if !self.vocal_active {
            transport.set_channel(Channel::Primary);
            self.vocal_active = true;
            self.events.push(JudgeEvent::VocalChannel { active: true });
        }
    }

    fn cut_vocal<T>(&mut self, transport: &mut T)
    where
        T: SongTransport + ?Sized,
    {
        if self.vocal_active {
            transport.set_channel(Channel::Secondary);
            self.vocal_active = false;
            self.events.push(JudgeEvent::VocalChannel { active: false });
        }
    }

    // ───────────────────────────────────────────────────────────────────
    // Queries
    // ───────────────────────────────────────────────────────────────────

    pub fn events(&self) -> &[JudgeEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> std::vec::Drain<'_, JudgeEvent> {
        self.events.drain(..)
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Song has ended and the scroll has passed the last section
    pub fn is_finished(&self) -> bool {
        self.phase == SessionPhase::Ended && self.song_step >= self.chart.end_step() as i32
    }

    pub fn scroll(&self) -> Fixed {
        self.scroll
    }

    pub fn song_step(&self) -> i32 {
        self.song_step
    }

    pub fn just_step(&self) -> bool {
        self.just_step
    }

    pub fn is_audible(&self) -> bool {
        self.audible
    }

    pub fn section_index(&self) -> usize {
        self.section
    }

    pub fn current_section(&self) -> &Section {
        &self.chart.sections()[self.section]
    }

    pub fn note_cursor(&self) -> usize {
        self.note_cursor
    }

    pub fn health(&self) -> i32 {
        self.health
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn combo(&self) -> u32 {
        self.combo
    }

    pub fn max_combo(&self) -> u32 {
        self.max_combo
    }

    pub fn hit_flash(&self, lane: usize) -> u8 {
        self.hit_flash.get(lane).copied().unwrap_or(0)
    }

    pub fn vocal_active(&self) -> bool {
        self.vocal_active
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn pulse(&self) -> Pulse {
        self.pulse
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn chart(&self) -> &Chart {
        &self.chart
    }

    /// Screen offset of a chart position from the strum line, in pixels
    pub fn note_offset_px(&self, pos: u16) -> Fixed {
        self.timing.note_offset_px(pos, self.scroll)
    }
}

fn focus_of(section: &Section) -> Focus {
    if section.opponent_focus() {
        Focus::Opponent
    } else {
        Focus::Player
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssets;
    use crate::chart::{Note, NoteFlags, SectionFlags};
    use crate::rhythm::input::Buttons;

    #[derive(Default)]
    struct FakeTransport {
        playing: bool,
        elapsed_ms: u64,
        starts: u32,
        channels: Vec<Channel>,
    }

    impl SongTransport for FakeTransport {
        fn start_song(&mut self) -> Result<(), PlaybackError> {
            self.starts += 1;
            self.playing = true;
            self.elapsed_ms = 0;
            Ok(())
        }

        fn is_playing(&self) -> bool {
            self.playing
        }

        fn elapsed_ms(&self) -> u64 {
            self.elapsed_ms
        }

        fn set_channel(&mut self, channel: Channel) {
            self.channels.push(channel);
        }
    }

    /// 120 bpm: 8 steps per second, 125ms per step
    fn stage() -> StageDef {
        StageDef {
            bpm: Fixed::from_int(120),
            speed: [Fixed::ONE; 3],
            preroll_steps: 0,
            ..Default::default()
        }
    }

    fn step_pos(step: u16) -> u16 {
        step * POS_UNITS_PER_STEP as u16
    }

    fn player(step: u16, lane: u8) -> Note {
        Note::new(step_pos(step), lane, NoteFlags::empty())
    }

    fn engine_with(notes: Vec<Note>, tuning: JudgeTuning) -> (RhythmEngine, FakeTransport) {
        let chart = Chart::new(vec![Section::new(64, SectionFlags::empty())], notes).unwrap();
        let mut engine = RhythmEngine::new(chart, &stage(), Difficulty::Normal, tuning, 60).unwrap();
        let mut transport = FakeTransport::default();
        // Zero-length pre-roll: the first tick starts the song
        engine.tick(&mut transport, &PadState::default()).unwrap();
        assert_eq!(engine.phase(), SessionPhase::Live);
        (engine, transport)
    }

    fn engine(notes: Vec<Note>) -> (RhythmEngine, FakeTransport) {
        engine_with(notes, JudgeTuning::default())
    }

    fn press(lane: usize) -> PadState {
        let button = Buttons::lane(lane);
        PadState::new(button, button)
    }

    fn hold(lane: usize) -> PadState {
        PadState::new(Buttons::lane(lane), Buttons::empty())
    }

    fn tick_at(
        engine: &mut RhythmEngine,
        transport: &mut FakeTransport,
        ms: u64,
        pad: PadState,
    ) -> Result<(), SessionError> {
        transport.elapsed_ms = ms;
        engine.tick(transport, &pad)
    }

    #[test]
    fn test_earliest_matching_note_wins() {
        let notes = vec![
            player(10, 0),
            Note::new(step_pos(20), 0, NoteFlags::SUSTAIN),
            player(20, 0),
            player(30, 0),
        ];
        let (mut engine, mut transport) = engine(notes);

        tick_at(&mut engine, &mut transport, 1250, press(0)).unwrap();
        assert!(engine.chart().notes()[0].is_hit());
        assert_eq!(engine.combo(), 1);

        tick_at(&mut engine, &mut transport, 2500, press(0)).unwrap();
        // The press skips the sustain body; the held lane then picks it up
        assert!(engine.chart().notes()[1].is_hit());
        assert!(engine.chart().notes()[2].is_hit());
        assert!(engine.events().contains(&JudgeEvent::SustainHit { lane: 0 }));
        assert!(!engine.chart().notes()[3].is_hit());
        assert_eq!(engine.combo(), 2);
        assert!(engine.events().contains(&JudgeEvent::Hit {
            lane: 0,
            tier: HitTier::Sick,
            offset: Fixed::ZERO,
            combo: 2,
        }));

        // Nothing pressable left in the window
        tick_at(&mut engine, &mut transport, 2500, press(0)).unwrap();
        assert!(engine.events().contains(&JudgeEvent::Miss {
            lane: 0,
            cause: MissCause::Press
        }));
        assert!(engine.events().contains(&JudgeEvent::ComboBroken { was: 2 }));
        assert_eq!(engine.combo(), 0);
        assert_eq!(engine.health(), 10000 + 3 * 230 - 400);
    }

    #[test]
    fn test_simultaneous_notes_resolve_in_storage_order() {
        let (mut engine, mut transport) = engine(vec![player(20, 0), player(20, 0)]);

        tick_at(&mut engine, &mut transport, 2500, press(0)).unwrap();
        let hits: Vec<bool> = engine.chart().notes().iter().map(|n| n.is_hit()).collect();
        assert_eq!(hits, vec![true, false]);

        tick_at(&mut engine, &mut transport, 2510, press(0)).unwrap();
        assert!(engine.chart().notes()[1].is_hit());
        assert_eq!(engine.combo(), 2);
    }

    #[test]
    fn test_press_only_matches_own_lane_and_owner() {
        let notes = vec![
            player(8, 1),
            Note::new(step_pos(8), 0, NoteFlags::OPPONENT),
        ];
        let (mut engine, mut transport) = engine(notes);

        tick_at(&mut engine, &mut transport, 995, press(0)).unwrap();
        assert!(engine.events().contains(&JudgeEvent::Miss {
            lane: 0,
            cause: MissCause::Press
        }));
        assert!(!engine.chart().notes()[0].is_hit());
    }

    #[test]
    fn test_late_press_tiers() {
        let (mut engine, mut transport) = engine(vec![player(8, 2)]);

        // 160ms late: 1.28 steps against a 1.33 step window
        tick_at(&mut engine, &mut transport, 1160, press(2)).unwrap();
        let tier = engine.events().iter().find_map(|e| match e {
            JudgeEvent::Hit { tier, .. } => Some(*tier),
            _ => None,
        });
        assert_eq!(tier, Some(HitTier::Shit));
        assert_eq!(engine.score(), 50);
    }

    #[test]
    fn test_press_past_late_window_misses() {
        // 1166ms is the last millisecond inside the window of a step 8 note
        let (mut inside, mut transport) = engine(vec![player(8, 1)]);
        tick_at(&mut inside, &mut transport, 1166, press(1)).unwrap();
        assert!(inside.chart().notes()[0].is_hit());
        assert_eq!(inside.combo(), 1);

        let (mut engine, mut transport) = engine(vec![player(8, 1)]);
        tick_at(&mut engine, &mut transport, 1167, press(1)).unwrap();
        let late_by = engine.scroll() - Fixed::from_int(8);
        assert!(late_by > engine.timing().late_safe);
        assert_eq!(late_by, engine.timing().late_safe + Fixed::from_raw(11));

        assert!(engine.events().contains(&JudgeEvent::Miss {
            lane: 1,
            cause: MissCause::Press
        }));
        assert!(engine.events().iter().all(|e| !matches!(e, JudgeEvent::Hit { .. })));
        assert!(!engine.chart().notes()[0].is_hit());
        assert_eq!(engine.combo(), 0);
        assert_eq!(engine.score(), 0);
        assert_eq!(engine.health(), 10000 - 400);
        // Not yet far enough above the line to be swept
        assert_eq!(engine.note_cursor(), 0);
    }

    #[test]
    fn test_invalid_tempo_rejected() {
        for bpm in [Fixed::ZERO, Fixed::from_f64(0.01)] {
            let chart = Chart::new(vec![Section::new(16, SectionFlags::empty())], vec![]).unwrap();
            let slow = StageDef { bpm, ..stage() };
            let result =
                RhythmEngine::new(chart, &slow, Difficulty::Normal, JudgeTuning::default(), 60);
            assert!(matches!(result, Err(SessionError::InvalidStage { .. })));
        }

        let chart = Chart::new(vec![Section::new(16, SectionFlags::empty())], vec![]).unwrap();
        let assets = MemoryAssets::new().with("chart/1.1N.cht", chart.to_bytes());
        let from_yaml: StageDef = serde_yaml::from_str("week: 1\nsong: 1\nbpm: 0\n").unwrap();
        let result =
            RhythmEngine::load(&assets, &from_yaml, Difficulty::Normal, JudgeTuning::default(), 60);
        assert!(matches!(result, Err(SessionError::InvalidStage { .. })));

        let reversed = StageDef {
            speed: [-Fixed::ONE; 3],
            ..stage()
        };
        let chart = Chart::new(vec![Section::new(16, SectionFlags::empty())], vec![]).unwrap();
        let result =
            RhythmEngine::new(chart, &reversed, Difficulty::Normal, JudgeTuning::default(), 60);
        assert!(matches!(result, Err(SessionError::InvalidStage { .. })));
    }

    #[test]
    fn test_sick_hit_scores_and_flashes() {
        let (mut engine, mut transport) = engine(vec![player(8, 3)]);

        tick_at(&mut engine, &mut transport, 1000, press(3)).unwrap();
        assert_eq!(engine.score(), 350);
        assert_eq!(engine.hit_flash(3), 6);
        assert_eq!(engine.max_combo(), 1);

        tick_at(&mut engine, &mut transport, 1016, PadState::default()).unwrap();
        assert_eq!(engine.hit_flash(3), 5);
    }

    #[test]
    fn test_sustain_hold_counts_entry_once() {
        let notes = vec![
            player(4, 1),
            Note::new(108, 1, NoteFlags::SUSTAIN),
            Note::new(120, 1, NoteFlags::SUSTAIN),
            Note::new(132, 1, NoteFlags::SUSTAIN | NoteFlags::SUSTAIN_END),
        ];
        let (mut engine, mut transport) = engine(notes);

        // The press also holds, picking up the first body in the same tick
        tick_at(&mut engine, &mut transport, 500, press(1)).unwrap();
        assert_eq!(engine.combo(), 1);
        assert!(engine.chart().notes()[1].is_hit());

        for ms in [562, 625] {
            tick_at(&mut engine, &mut transport, ms, hold(1)).unwrap();
            assert!(engine.events().contains(&JudgeEvent::SustainHit { lane: 1 }));
        }

        assert!(engine.chart().notes().iter().all(|n| n.is_hit()));
        assert_eq!(engine.combo(), 1);
        assert_eq!(engine.health(), 10000 + 4 * 230);
    }

    #[test]
    fn test_hold_without_press_enters_once() {
        let notes = vec![
            Note::new(96, 2, NoteFlags::SUSTAIN),
            Note::new(108, 2, NoteFlags::SUSTAIN | NoteFlags::SUSTAIN_END),
        ];
        let (mut engine, mut transport) = engine(notes);

        tick_at(&mut engine, &mut transport, 500, hold(2)).unwrap();
        tick_at(&mut engine, &mut transport, 562, hold(2)).unwrap();
        assert_eq!(engine.combo(), 1);
        assert!(engine.chart().notes().iter().all(|n| n.is_hit()));
    }

    #[test]
    fn test_hold_keeps_flash_lit() {
        let (mut engine, mut transport) = engine(vec![]);
        tick_at(&mut engine, &mut transport, 100, hold(0)).unwrap();
        assert_eq!(engine.hit_flash(0), 1);
        tick_at(&mut engine, &mut transport, 116, hold(0)).unwrap();
        assert_eq!(engine.hit_flash(0), 1);
        tick_at(&mut engine, &mut transport, 132, PadState::default()).unwrap();
        assert_eq!(engine.hit_flash(0), 0);
    }

    #[test]
    fn test_swept_note_misses_and_cuts_vocal() {
        let mut notes = vec![player(2, 3)];
        notes.push(Note::new(step_pos(9), 1, NoteFlags::OPPONENT));
        let chart = Chart::new(
            vec![
                Section::new(8, SectionFlags::empty()),
                Section::new(16, SectionFlags::OPPONENT_FOCUS | SectionFlags::ALT_ANIM),
            ],
            notes,
        )
        .unwrap();
        let mut engine =
            RhythmEngine::new(chart, &stage(), Difficulty::Normal, JudgeTuning::default(), 60).unwrap();
        let mut transport = FakeTransport::default();
        engine.tick(&mut transport, &PadState::default()).unwrap();

        // Step 7: note at step 2 is 87.5px above the line and outside the window
        tick_at(&mut engine, &mut transport, 875, PadState::default()).unwrap();
        assert!(engine.events().contains(&JudgeEvent::Miss {
            lane: 3,
            cause: MissCause::Swept
        }));
        assert!(engine.events().contains(&JudgeEvent::VocalChannel { active: false }));
        assert_eq!(engine.health(), 10000 - 475);
        assert_eq!(engine.note_cursor(), 1);
        assert_eq!(transport.channels, vec![Channel::Secondary]);

        // Step 9: the opponent sings and restores the vocal track
        tick_at(&mut engine, &mut transport, 1125, PadState::default()).unwrap();
        assert!(engine
            .events()
            .contains(&JudgeEvent::OpponentNote { lane: 1, alt: true }));
        assert!(engine.vocal_active());
        assert_eq!(transport.channels, vec![Channel::Secondary, Channel::Primary]);
        assert!(engine.chart().notes()[1].is_hit());
    }

    #[test]
    fn test_vocal_switch_is_edge_triggered() {
        let (mut engine, mut transport) = engine(vec![player(4, 0), player(5, 0)]);
        tick_at(&mut engine, &mut transport, 500, press(0)).unwrap();
        tick_at(&mut engine, &mut transport, 625, press(0)).unwrap();
        // Vocals were never cut, so hits don't touch the channel
        assert!(transport.channels.is_empty());
    }

    #[test]
    fn test_not_yet_audible_suppresses_judgement() {
        let (mut engine, mut transport) = engine(vec![Note::new(0, 0, NoteFlags::OPPONENT)]);

        tick_at(&mut engine, &mut transport, 0, press(0)).unwrap();
        assert!(!engine.is_audible());
        assert!(engine.events().iter().all(|e| !matches!(e, JudgeEvent::Miss { .. })));
        assert!(!engine.chart().notes()[0].is_hit());

        tick_at(&mut engine, &mut transport, 10, PadState::default()).unwrap();
        assert!(engine.chart().notes()[0].is_hit());
    }

    #[test]
    fn test_scroll_never_rewinds() {
        let (mut engine, mut transport) = engine(vec![]);
        tick_at(&mut engine, &mut transport, 1000, PadState::default()).unwrap();
        assert_eq!(engine.scroll(), Fixed::from_int(8));

        tick_at(&mut engine, &mut transport, 990, PadState::default()).unwrap();
        assert_eq!(engine.scroll(), Fixed::from_int(8));
    }

    #[test]
    fn test_preroll_duration() {
        let chart = Chart::new(vec![Section::new(16, SectionFlags::empty())], vec![]).unwrap();
        let stage = StageDef {
            preroll_steps: 8,
            ..stage()
        };
        let mut engine =
            RhythmEngine::new(chart, &stage, Difficulty::Normal, JudgeTuning::default(), 60).unwrap();
        let mut transport = FakeTransport::default();

        assert_eq!(engine.scroll(), Fixed::from_int(-8));
        // 8 steps at 8 steps/s and 60 ticks/s, rounded down per tick
        for _ in 0..60 {
            engine.tick(&mut transport, &PadState::default()).unwrap();
        }
        assert_eq!(engine.phase(), SessionPhase::PreRoll);
        assert_eq!(transport.starts, 0);

        engine.tick(&mut transport, &PadState::default()).unwrap();
        assert_eq!(engine.phase(), SessionPhase::Live);
        assert_eq!(engine.scroll(), Fixed::ZERO);
        assert_eq!(transport.starts, 1);
    }

    #[test]
    fn test_ended_free_runs() {
        let (mut engine, mut transport) = engine(vec![]);
        tick_at(&mut engine, &mut transport, 1000, PadState::default()).unwrap();

        transport.playing = false;
        engine.tick(&mut transport, &PadState::default()).unwrap();
        assert_eq!(engine.phase(), SessionPhase::Ended);
        let advance = engine.timing().tick_advance;
        assert_eq!(engine.scroll(), Fixed::from_int(8) + advance);

        engine.tick(&mut transport, &PadState::default()).unwrap();
        assert_eq!(engine.scroll(), Fixed::from_int(8) + advance + advance);
    }

    #[test]
    fn test_sections_refocus_and_clamp() {
        let chart = Chart::new(
            vec![
                Section::new(4, SectionFlags::OPPONENT_FOCUS),
                Section::new(8, SectionFlags::empty()),
                Section::new(12, SectionFlags::OPPONENT_FOCUS),
            ],
            vec![],
        )
        .unwrap();
        let mut engine =
            RhythmEngine::new(chart, &stage(), Difficulty::Normal, JudgeTuning::default(), 60).unwrap();
        assert_eq!(engine.focus(), Focus::Opponent);

        let mut transport = FakeTransport::default();
        engine.tick(&mut transport, &PadState::default()).unwrap();

        tick_at(&mut engine, &mut transport, 1000, PadState::default()).unwrap();
        assert_eq!(engine.section_index(), 2);
        let focus: Vec<&JudgeEvent> = engine
            .events()
            .iter()
            .filter(|e| matches!(e, JudgeEvent::CameraFocus(_)))
            .collect();
        assert_eq!(
            focus,
            vec![
                &JudgeEvent::CameraFocus(Focus::Player),
                &JudgeEvent::CameraFocus(Focus::Opponent)
            ]
        );

        tick_at(&mut engine, &mut transport, 10_000, PadState::default()).unwrap();
        assert_eq!(engine.section_index(), 2);
    }

    #[test]
    fn test_step_events_and_pulse() {
        let (mut engine, mut transport) = engine(vec![]);

        tick_at(&mut engine, &mut transport, 2000, PadState::default()).unwrap();
        assert!(engine.just_step());
        assert!(engine.events().contains(&JudgeEvent::Step(16)));
        assert_eq!(engine.pulse().bump, Fixed::ONE + Fixed::from_ratio(75, 100).div_int(16));
        assert_eq!(engine.pulse().sbump, Fixed::ONE + Fixed::from_ratio(75, 100).div_int(24));

        tick_at(&mut engine, &mut transport, 2000, PadState::default()).unwrap();
        assert!(!engine.just_step());

        tick_at(&mut engine, &mut transport, 2125, PadState::default()).unwrap();
        assert_eq!(engine.pulse(), Pulse::default());
    }

    #[test]
    fn test_health_clamps_and_depletes() {
        let tuning = JudgeTuning {
            start_health: 19900,
            ..Default::default()
        };
        let (mut engine, mut transport) = engine_with(vec![player(8, 0)], tuning);
        tick_at(&mut engine, &mut transport, 1000, press(0)).unwrap();
        assert_eq!(engine.health(), 20000);

        let tuning = JudgeTuning {
            start_health: 300,
            ..Default::default()
        };
        let (mut engine, mut transport) = engine_with(vec![], tuning);
        let result = tick_at(&mut engine, &mut transport, 1000, press(0));
        assert!(matches!(
            result,
            Err(SessionError::HealthDepleted { health: -100, .. })
        ));
    }

    #[test]
    fn test_load_reads_chart_asset() {
        let chart = Chart::new(vec![Section::new(16, SectionFlags::empty())], vec![player(4, 0)])
            .unwrap();
        let stage = StageDef {
            week: 1,
            song: 2,
            ..stage()
        };
        let assets = MemoryAssets::new().with("chart/1.2H.cht", chart.to_bytes());

        let engine =
            RhythmEngine::load(&assets, &stage, Difficulty::Hard, JudgeTuning::default(), 60)
                .unwrap();
        assert_eq!(engine.chart(), &chart);

        let missing = RhythmEngine::load(&assets, &stage, Difficulty::Easy, JudgeTuning::default(), 60);
        assert!(matches!(missing, Err(SessionError::Asset(AssetError::NotFound(_)))));
    }
}
