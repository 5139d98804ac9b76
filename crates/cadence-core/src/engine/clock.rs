//! Playback clock
//!
//! One mutex guards the play state, the active channel, the last callback
//! timestamp and both mixer slots. The audio callback renders through
//! [`PlaybackClock::render`]; any other thread reads the interpolated elapsed
//! time with [`PlaybackClock::elapsed`], which copies the timing fields under
//! the lock and extrapolates outside it.
//!
//! ```text
//! ┌──────────────────┐  render()   ┌───────────────────────────┐
//! │  Audio callback  │────────────►│ Mutex<Shared>             │
//! │  (device thread) │             │  state, channel           │
//! └──────────────────┘             │  last_elapsed, anchor     │
//!                                  │  DualTrackMixer           │
//! ┌──────────────────┐  elapsed()  │                           │
//! │   Tick thread    │────────────►│  (copy 3 fields, unlock)  │
//! └──────────────────┘             └───────────────────────────┘
//! ```
//!
//! Decoding never happens under the lock: a new track is decoded into a
//! temporary pair of buffers and only swapped in under the lock.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;

use super::mixer::{DualTrackMixer, SlotPair};
use crate::assets::{AssetError, AssetSource, TrackSpec};
use crate::audio_file::{decode_track, DecodeError};
use crate::types::{Channel, StereoFrame, NUM_SLOTS};

/// Errors raised while loading a track for playback
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("Failed to decode '{name}': {source}")]
    Decode {
        name: String,
        #[source]
        source: DecodeError,
    },
}

/// Wall-clock source for interpolation
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// The real monotonic clock
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicTime;

impl TimeSource for MonotonicTime {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to
///
/// Used to drive the playback clock and the tick loop deterministically.
#[derive(Debug)]
pub struct ManualTime {
    origin: Instant,
    offset_nanos: AtomicU64,
}

impl ManualTime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_nanos: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset_nanos
            .fetch_add(by.as_nanos() as u64, AtomicOrdering::SeqCst);
    }

    /// Jump to an absolute offset from the origin
    pub fn set(&self, offset: Duration) {
        self.offset_nanos
            .store(offset.as_nanos() as u64, AtomicOrdering::SeqCst);
    }

    pub fn offset(&self) -> Duration {
        Duration::from_nanos(self.offset_nanos.load(AtomicOrdering::SeqCst))
    }
}

impl Default for ManualTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> Instant {
        self.origin + self.offset()
    }
}

/// Playback state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockState {
    #[default]
    Stopped,
    Playing,
    PlayingLooping,
}

impl ClockState {
    #[inline]
    pub fn is_playing(self) -> bool {
        self != ClockState::Stopped
    }
}

/// State shared between the audio callback and readers
struct Shared {
    state: ClockState,
    channel: Channel,
    /// Elapsed time at the last mix callback
    last_elapsed: Duration,
    /// Instant `last_elapsed` was captured
    anchor: Instant,
    /// Bumped on every restart (start, seek, loop rewind)
    epoch: u64,
    mixer: DualTrackMixer,
    loaded: Option<TrackSpec>,
}

/// Highest elapsed value handed out in the current epoch
///
/// Only reader threads touch this, never the audio callback.
struct Floor {
    epoch: u64,
    value: Duration,
}

struct Inner {
    shared: Mutex<Shared>,
    floor: Mutex<Floor>,
    time: Arc<dyn TimeSource>,
    sample_rate: u32,
}

/// Shared playback context: mixer slots, play state and time base
///
/// Cheap to clone; all clones refer to the same context. One clone goes to
/// the audio callback, another to the tick loop.
#[derive(Clone)]
pub struct PlaybackClock {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PlaybackClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackClock")
            .field("sample_rate", &self.inner.sample_rate)
            .field("state", &self.state())
            .finish()
    }
}

#[inline]
fn frames_to_duration(frames: usize, sample_rate: u32) -> Duration {
    Duration::from_nanos((frames as u64).saturating_mul(1_000_000_000) / sample_rate as u64)
}

impl PlaybackClock {
    /// Create a clock for a device running at `sample_rate`
    pub fn new(sample_rate: u32) -> Self {
        Self::with_time_source(sample_rate, Arc::new(MonotonicTime))
    }

    pub fn with_time_source(sample_rate: u32, time: Arc<dyn TimeSource>) -> Self {
        let now = time.now();
        Self {
            inner: Arc::new(Inner {
                shared: Mutex::new(Shared {
                    state: ClockState::Stopped,
                    channel: Channel::Primary,
                    last_elapsed: Duration::ZERO,
                    anchor: now,
                    epoch: 0,
                    mixer: DualTrackMixer::new(),
                    loaded: None,
                }),
                floor: Mutex::new(Floor {
                    epoch: 0,
                    value: Duration::ZERO,
                }),
                time,
                sample_rate,
            }),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    // The guarded data is plain values swapped or copied whole, so a panic
    // elsewhere cannot leave it half-updated
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.inner.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ───────────────────────────────────────────────────────────────────
    // Audio callback side
    // ───────────────────────────────────────────────────────────────────

    /// Mix the next block into `out` (expected to be pre-cleared)
    ///
    /// Records the elapsed time for interpolation and handles end of track:
    /// looping rewinds both slots, otherwise playback stops.
    pub fn render(&self, out: &mut [StereoFrame]) {
        let mut shared = self.lock();
        if !shared.state.is_playing() {
            return;
        }

        let channel = shared.channel;
        shared.mixer.mix_into(out, channel);

        let consumed = shared.mixer.consumed(channel);
        shared.last_elapsed = frames_to_duration(consumed, self.inner.sample_rate);
        shared.anchor = self.inner.time.now();

        if shared.mixer.all_exhausted() {
            if shared.state == ClockState::PlayingLooping {
                shared.mixer.rewind_all();
                shared.last_elapsed = Duration::ZERO;
                shared.epoch += 1;
            } else {
                shared.state = ClockState::Stopped;
            }
        }
    }

    // ───────────────────────────────────────────────────────────────────
    // Reader side
    // ───────────────────────────────────────────────────────────────────

    /// Interpolated elapsed playback time
    ///
    /// `last callback time + (now - anchor)` while playing, frozen while
    /// stopped. Never decreases between two restarts, even when a late
    /// callback reports less than an earlier extrapolation.
    pub fn elapsed(&self) -> Duration {
        let (playing, last, anchor, epoch) = {
            let shared = self.lock();
            (
                shared.state.is_playing(),
                shared.last_elapsed,
                shared.anchor,
                shared.epoch,
            )
        };

        let estimate = if playing {
            last + self.inner.time.now().saturating_duration_since(anchor)
        } else {
            last
        };

        let mut floor = self.inner.floor.lock().unwrap_or_else(PoisonError::into_inner);
        match epoch.cmp(&floor.epoch) {
            Ordering::Greater => {
                *floor = Floor {
                    epoch,
                    value: estimate,
                };
                estimate
            }
            Ordering::Equal => {
                floor.value = floor.value.max(estimate);
                floor.value
            }
            // A restart raced past this read; don't pollute the new epoch
            Ordering::Less => estimate,
        }
    }

    /// Interpolated elapsed time in whole milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    pub fn state(&self) -> ClockState {
        self.lock().state
    }

    pub fn is_playing(&self) -> bool {
        self.state().is_playing()
    }

    pub fn active_channel(&self) -> Channel {
        self.lock().channel
    }

    pub fn loaded_track(&self) -> Option<TrackSpec> {
        self.lock().loaded.clone()
    }

    /// Cursor position of each mixer slot (None for empty slots)
    pub fn slot_positions(&self) -> [Option<usize>; NUM_SLOTS] {
        self.lock().mixer.positions()
    }

    // ───────────────────────────────────────────────────────────────────
    // Control surface
    // ───────────────────────────────────────────────────────────────────

    /// Load `track` (if not already loaded) and start playing it
    pub fn load_and_play(
        &self,
        assets: &dyn AssetSource,
        track: &TrackSpec,
        channel: Channel,
        looping: bool,
    ) -> Result<(), PlaybackError> {
        self.seek(assets, track)?;
        self.start(channel, looping);
        Ok(())
    }

    /// Load `track` without playing it
    ///
    /// Stops playback and selects channel 0. Reselecting the loaded track
    /// only rewinds both cursors; a different track releases the old buffers
    /// before decoding the new ones.
    pub fn seek(&self, assets: &dyn AssetSource, track: &TrackSpec) -> Result<(), PlaybackError> {
        let stale = {
            let mut shared = self.lock();
            shared.state = ClockState::Stopped;
            shared.channel = Channel::Primary;
            shared.last_elapsed = Duration::ZERO;
            shared.epoch += 1;

            if shared.loaded.as_ref() == Some(track) {
                shared.mixer.rewind_all();
                None
            } else {
                shared.loaded = None;
                Some(shared.mixer.take())
            }
        };

        let Some(stale) = stale else {
            log::debug!("Seek: {} already loaded, rewound", track);
            return Ok(());
        };
        drop(stale);

        let slots = load_slots(assets, track, self.inner.sample_rate)?;

        let displaced = {
            let mut shared = self.lock();
            shared.loaded = Some(track.clone());
            shared.mixer.replace(slots)
        };
        drop(displaced);

        log::info!("Loaded track {}", track);
        Ok(())
    }

    /// Start playing whatever is loaded from the current cursor position
    pub fn start(&self, channel: Channel, looping: bool) {
        {
            let mut shared = self.lock();
            shared.state = if looping {
                ClockState::PlayingLooping
            } else {
                ClockState::Playing
            };
            shared.channel = channel;
            shared.last_elapsed = Duration::ZERO;
            shared.anchor = self.inner.time.now();
            shared.epoch += 1;
        }
        log::debug!("Playback started (channel {:?}, looping: {})", channel, looping);
    }

    /// Stop without releasing buffers
    pub fn pause(&self) {
        self.lock().state = ClockState::Stopped;
        log::debug!("Playback paused");
    }

    /// Stop and release both mixer slots
    pub fn stop(&self) {
        let stale = {
            let mut shared = self.lock();
            shared.state = ClockState::Stopped;
            shared.channel = Channel::Primary;
            shared.loaded = None;
            shared.mixer.take()
        };
        drop(stale);
        log::debug!("Playback stopped");
    }

    /// Select the audible slot
    pub fn set_active_channel(&self, channel: Channel) {
        let previous = std::mem::replace(&mut self.lock().channel, channel);
        if previous != channel {
            log::debug!("Active channel {:?} -> {:?}", previous, channel);
        }
    }

    /// Put pre-decoded buffers in place of whatever is loaded (stopped)
    ///
    /// For tooling that decodes ahead of time; a later `seek` of the same
    /// track reuses these buffers.
    pub fn install(&self, track: TrackSpec, slots: SlotPair) {
        let stale = {
            let mut shared = self.lock();
            shared.state = ClockState::Stopped;
            shared.channel = Channel::Primary;
            shared.last_elapsed = Duration::ZERO;
            shared.epoch += 1;
            shared.loaded = Some(track);
            shared.mixer.replace(slots)
        };
        drop(stale);
    }
}

/// Read and decode every asset of a track into fresh mixer slots
fn load_slots(
    assets: &dyn AssetSource,
    track: &TrackSpec,
    sample_rate: u32,
) -> Result<SlotPair, PlaybackError> {
    let mut slots: SlotPair = [None, None];
    for (slot, name) in slots.iter_mut().zip(track.asset_names()) {
        let Some(name) = name else { continue };
        let bytes = assets.read(&name)?;
        let extension = Path::new(&name).extension().and_then(|e| e.to_str());
        let decoded = decode_track(bytes, extension, sample_rate)
            .map_err(|source| PlaybackError::Decode {
                name: name.clone(),
                source,
            })?;
        *slot = Some(decoded);
    }
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssets;
    use crate::engine::DecodedTrack;
    use std::io::Cursor;
    use std::sync::atomic::AtomicUsize;

    const RATE: u32 = 48000;

    fn silence(frames: usize) -> DecodedTrack {
        DecodedTrack::new(vec![StereoFrame::silence(); frames])
    }

    fn manual_clock() -> (PlaybackClock, Arc<ManualTime>) {
        let time = Arc::new(ManualTime::new());
        (PlaybackClock::with_time_source(RATE, time.clone()), time)
    }

    fn wav_bytes(frames: usize, value: i16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..frames * 2 {
                writer.write_sample(value).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    /// Memory assets that count reads, to observe redundant decodes
    struct CountingAssets {
        inner: MemoryAssets,
        reads: AtomicUsize,
    }

    impl AssetSource for CountingAssets {
        fn read(&self, name: &str) -> Result<Vec<u8>, AssetError> {
            self.reads.fetch_add(1, AtomicOrdering::SeqCst);
            self.inner.read(name)
        }
    }

    fn counting_assets() -> CountingAssets {
        // ".mp3" names with WAV content; the probe sniffs the real format
        let inner = MemoryAssets::new()
            .with("music/songv.mp3", wav_bytes(4800, 100))
            .with("music/songi.mp3", wav_bytes(4800, 200))
            .with("music/other.mp3", wav_bytes(2400, 300));
        CountingAssets {
            inner,
            reads: AtomicUsize::new(0),
        }
    }

    #[test]
    fn test_render_records_elapsed_and_interpolates() {
        let (clock, time) = manual_clock();
        clock.install(TrackSpec::plain("t"), [Some(silence(RATE as usize)), None]);
        clock.start(Channel::Primary, false);

        let mut out = vec![StereoFrame::silence(); 480];
        clock.render(&mut out);
        assert_eq!(clock.elapsed(), Duration::from_millis(10));

        time.advance(Duration::from_millis(5));
        assert_eq!(clock.elapsed(), Duration::from_millis(15));
        assert_eq!(clock.elapsed_ms(), 15);
    }

    #[test]
    fn test_elapsed_monotonic_under_jitter() {
        let (clock, time) = manual_clock();
        clock.install(TrackSpec::plain("t"), [Some(silence(RATE as usize * 4)), None]);
        clock.start(Channel::Primary, false);

        // 480-frame callbacks (10ms of audio) arriving early and late
        let intervals_ms = [12u64, 8, 15, 5, 10, 3, 17, 10, 9, 11];
        let mut out = vec![StereoFrame::silence(); 480];
        let mut last = Duration::ZERO;

        for &interval in intervals_ms.iter().cycle().take(200) {
            for _ in 0..interval {
                time.advance(Duration::from_millis(1));
                let now = clock.elapsed();
                assert!(now >= last, "elapsed went backwards: {:?} < {:?}", now, last);
                last = now;
            }
            out.fill(StereoFrame::silence());
            clock.render(&mut out);
            let now = clock.elapsed();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_end_of_track_stops() {
        let (clock, _time) = manual_clock();
        clock.install(TrackSpec::plain("t"), [Some(silence(1000)), None]);
        clock.start(Channel::Primary, false);

        let mut out = vec![StereoFrame::silence(); 480];
        clock.render(&mut out);
        clock.render(&mut out);
        assert!(clock.is_playing());
        clock.render(&mut out);
        assert_eq!(clock.state(), ClockState::Stopped);

        // Frozen at the track length once stopped
        let frozen = clock.elapsed();
        assert_eq!(frozen, frames_to_duration(1000, RATE));
        clock.render(&mut out);
        assert_eq!(clock.slot_positions(), [Some(1000), None]);
    }

    #[test]
    fn test_looping_rewinds() {
        let (clock, _time) = manual_clock();
        clock.install(TrackSpec::plain("t"), [Some(silence(960)), Some(silence(960))]);
        clock.start(Channel::Primary, true);

        let mut out = vec![StereoFrame::silence(); 480];
        clock.render(&mut out);
        clock.render(&mut out);
        assert_eq!(clock.state(), ClockState::PlayingLooping);
        assert_eq!(clock.slot_positions(), [Some(0), Some(0)]);
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_pause_keeps_buffers_and_freezes_time() {
        let (clock, time) = manual_clock();
        clock.install(TrackSpec::plain("t"), [Some(silence(4800)), None]);
        clock.start(Channel::Primary, false);

        let mut out = vec![StereoFrame::silence(); 480];
        clock.render(&mut out);
        clock.pause();
        time.advance(Duration::from_millis(100));

        assert!(!clock.is_playing());
        assert_eq!(clock.elapsed(), Duration::from_millis(10));
        clock.render(&mut out);
        assert_eq!(clock.slot_positions(), [Some(480), None]);
    }

    #[test]
    fn test_channel_swap_mid_playback() {
        let (clock, _time) = manual_clock();
        clock.install(TrackSpec::vocal("t"), [Some(silence(4800)), Some(silence(4800))]);
        clock.start(Channel::Primary, false);

        let mut out = vec![StereoFrame::silence(); 480];
        clock.render(&mut out);
        clock.set_active_channel(Channel::Secondary);
        clock.render(&mut out);
        clock.set_active_channel(Channel::Primary);
        clock.render(&mut out);

        assert_eq!(clock.slot_positions(), [Some(1440), Some(1440)]);
        assert_eq!(clock.elapsed(), Duration::from_millis(30));
    }

    #[test]
    fn test_reload_same_track_rewinds_without_decode() {
        let (clock, _time) = manual_clock();
        let assets = counting_assets();
        let track = TrackSpec::vocal("song");

        clock.load_and_play(&assets, &track, Channel::Primary, false).unwrap();
        assert_eq!(assets.reads.load(AtomicOrdering::SeqCst), 2);

        let mut out = vec![StereoFrame::silence(); 480];
        clock.render(&mut out);
        assert_eq!(out[0], StereoFrame::mono(100));
        assert_eq!(clock.slot_positions(), [Some(480), Some(480)]);

        clock.load_and_play(&assets, &track, Channel::Secondary, false).unwrap();
        assert_eq!(assets.reads.load(AtomicOrdering::SeqCst), 2);
        assert_eq!(clock.slot_positions(), [Some(0), Some(0)]);
        assert_eq!(clock.active_channel(), Channel::Secondary);
    }

    #[test]
    fn test_load_different_track_replaces_slots() {
        let (clock, _time) = manual_clock();
        let assets = counting_assets();

        clock.seek(&assets, &TrackSpec::vocal("song")).unwrap();
        clock.seek(&assets, &TrackSpec::plain("other")).unwrap();

        assert_eq!(assets.reads.load(AtomicOrdering::SeqCst), 3);
        assert_eq!(clock.slot_positions(), [Some(0), None]);
        assert_eq!(clock.loaded_track(), Some(TrackSpec::plain("other")));
        assert!(!clock.is_playing());
    }

    #[test]
    fn test_missing_asset_is_error() {
        let (clock, _time) = manual_clock();
        let assets = counting_assets();
        let result = clock.load_and_play(&assets, &TrackSpec::plain("nope"), Channel::Primary, false);
        assert!(matches!(result, Err(PlaybackError::Asset(AssetError::NotFound(_)))));
        assert!(!clock.is_playing());
        assert_eq!(clock.loaded_track(), None);
    }

    #[test]
    fn test_stop_releases_buffers() {
        let (clock, _time) = manual_clock();
        clock.install(TrackSpec::vocal("t"), [Some(silence(480)), Some(silence(480))]);
        clock.start(Channel::Secondary, false);
        clock.stop();

        assert_eq!(clock.slot_positions(), [None, None]);
        assert_eq!(clock.active_channel(), Channel::Primary);
        assert_eq!(clock.loaded_track(), None);
    }
}
