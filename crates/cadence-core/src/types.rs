//! Common types for Cadence
//!
//! The fundamental audio types shared by the decoder, the mixer and the
//! output backend.

/// Output channel count (the decode pipeline always produces stereo)
pub const OUTPUT_CHANNELS: usize = 2;

/// Fallback sample rate when the device does not report one we can use
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Number of mixer slots (instrumental plus optional vocal overlay)
pub const NUM_SLOTS: usize = 2;

/// Number of note lanes per side
pub const NUM_LANES: usize = 4;

/// Maximum frames rendered per mixer pass inside the audio callback
///
/// Larger device buffers are rendered in chunks of this size so the callback
/// never allocates.
pub const MAX_BUFFER_SIZE: usize = 8192;

/// A single interleaved stereo frame of 16-bit PCM
///
/// Uses `#[repr(C)]` to ensure predictable memory layout: [left, right].
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StereoFrame {
    pub left: i16,
    pub right: i16,
}

impl StereoFrame {
    /// Create a new stereo frame
    #[inline]
    pub fn new(left: i16, right: i16) -> Self {
        Self { left, right }
    }

    /// Create a silent stereo frame
    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Create a mono frame (same value in both channels)
    #[inline]
    pub fn mono(value: i16) -> Self {
        Self { left: value, right: value }
    }

    /// Left channel as a normalized float
    #[inline]
    pub fn left_f32(&self) -> f32 {
        self.left as f32 / 32768.0
    }

    /// Right channel as a normalized float
    #[inline]
    pub fn right_f32(&self) -> f32 {
        self.right as f32 / 32768.0
    }
}

// Mixing adds into a pre-cleared buffer; saturate rather than wrap on overlap
impl std::ops::Add for StereoFrame {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            left: self.left.saturating_add(other.left),
            right: self.right.saturating_add(other.right),
        }
    }
}

impl std::ops::AddAssign for StereoFrame {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left = self.left.saturating_add(other.left);
        self.right = self.right.saturating_add(other.right);
    }
}

/// Mixer channel selector: which slot is audible
///
/// For a vocal track, slot 0 holds the full mix with vocals and slot 1 the
/// instrumental. A plain track only fills slot 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(usize)]
pub enum Channel {
    #[default]
    Primary = 0,
    Secondary = 1,
}

impl Channel {
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// The slot that is not this one
    #[inline]
    pub fn other(self) -> Self {
        match self {
            Channel::Primary => Channel::Secondary,
            Channel::Secondary => Channel::Primary,
        }
    }
}
