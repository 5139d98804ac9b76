//! Signed fixed-point arithmetic
//!
//! Every value on the judged-gameplay path (scroll position, hit windows,
//! note speed, song time) is a [`Fixed`]. Keeping this path integer-only makes
//! a session bit-exact across machines for a given chart and input trace.
//!
//! Products and quotients are computed in `i64` and saturated back into the
//! `i32` representation, so an intermediate can never wrap.

use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of fractional bits
pub const FIXED_SHIFT: u32 = 12;

/// Raw value of 1.0
pub const FIXED_UNIT: i32 = 1 << FIXED_SHIFT;

/// Mask selecting the fractional bits of a raw value
pub const FIXED_FRAC_MASK: i32 = FIXED_UNIT - 1;

/// Signed fixed-point number with [`FIXED_SHIFT`] fractional bits
///
/// Example: 2.5 is stored as `(2 << 12) + 2048 = 10240`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fixed(i32);

#[inline]
fn saturate(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);
    pub const ONE: Fixed = Fixed(FIXED_UNIT);

    /// Create from a whole number
    #[inline]
    pub const fn from_int(value: i32) -> Self {
        Self(value << FIXED_SHIFT)
    }

    /// Create from a raw scaled value
    #[inline]
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// Create `num / den` (numerator widened by the scale before dividing)
    ///
    /// `from_ratio(13, 10)` is 1.3 truncated to the nearest representable
    /// value toward zero. Panics if `den` is zero.
    #[inline]
    pub fn from_ratio(num: i64, den: i64) -> Self {
        Self(saturate((num << FIXED_SHIFT) / den))
    }

    /// Raw scaled value
    #[inline]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Widen, multiply and shift down (floor, like an arithmetic shift)
    #[inline]
    pub fn mul(self, rhs: Fixed) -> Fixed {
        Fixed(saturate((self.0 as i64 * rhs.0 as i64) >> FIXED_SHIFT))
    }

    /// Widen the numerator by the scale, then divide (truncates toward zero)
    ///
    /// Panics if `rhs` is zero.
    #[inline]
    pub fn div(self, rhs: Fixed) -> Fixed {
        Fixed(saturate(((self.0 as i64) << FIXED_SHIFT) / rhs.0 as i64))
    }

    /// Multiply by a plain integer
    #[inline]
    pub fn mul_int(self, rhs: i32) -> Fixed {
        Fixed(saturate(self.0 as i64 * rhs as i64))
    }

    /// Divide by a plain integer (truncates toward zero). Panics if `rhs` is zero.
    #[inline]
    pub fn div_int(self, rhs: i32) -> Fixed {
        Fixed(self.0 / rhs)
    }

    /// Integer part, rounded toward negative infinity
    #[inline]
    pub const fn floor(self) -> i32 {
        self.0 >> FIXED_SHIFT
    }

    /// Fractional part (always in `[0, 1)`)
    #[inline]
    pub const fn frac(self) -> Fixed {
        Fixed(self.0 & FIXED_FRAC_MASK)
    }

    #[inline]
    pub fn abs(self) -> Fixed {
        Fixed(self.0.saturating_abs())
    }

    #[inline]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Convert from a float, rounding to the nearest representable value
    ///
    /// Only used at the configuration boundary, never on the judged path.
    pub fn from_f64(value: f64) -> Self {
        Fixed(saturate((value * FIXED_UNIT as f64).round() as i64))
    }

    /// Convert to a float for display and logging
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / FIXED_UNIT as f64
    }
}

impl Add for Fixed {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Fixed(self.0 + other.0)
    }
}

impl AddAssign for Fixed {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Fixed {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Fixed(self.0 - other.0)
    }
}

impl SubAssign for Fixed {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Fixed {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Fixed(-self.0)
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.to_f64())
    }
}

// Config files carry plain decimals (`bpm: 100`, `speed: 1.3`)
impl Serialize for Fixed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

impl<'de> Deserialize<'de> for Fixed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        f64::deserialize(deserializer).map(Fixed::from_f64)
    }
}
