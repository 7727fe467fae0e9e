//! LinearId - 128-bit unsigned integer made of two 64-bit limbs.
//!
//! Linear ids of octants on a uniform grid of level `l` need `3 * l` bits,
//! which exceeds a native word for `l > 21`. The arithmetic carries and
//! borrows between the limbs explicitly.

use std::fmt;
use std::ops::{Add, AddAssign, BitAnd, BitOr, BitOrAssign, Shl, Shr, Sub, SubAssign};

/// Width of a linear id in bits.
pub const LID_BITS: u32 = 128;

/// Unsigned 128-bit value stored as (high, low) limbs.
///
/// Field order matters: the derived `Ord` compares `high` first, which is the
/// numeric order of the full value.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinearId {
  high: u64,
  low: u64,
}

impl LinearId {
  /// Zero.
  pub const ZERO: Self = Self { high: 0, low: 0 };

  /// One.
  pub const ONE: Self = Self { high: 0, low: 1 };

  /// Largest representable value.
  pub const MAX: Self = Self {
    high: u64::MAX,
    low: u64::MAX,
  };

  /// Create from high and low limbs.
  #[inline]
  pub const fn new(high: u64, low: u64) -> Self {
    Self { high, low }
  }

  /// High 64 bits.
  #[inline]
  pub const fn high(&self) -> u64 {
    self.high
  }

  /// Low 64 bits.
  #[inline]
  pub const fn low(&self) -> u64 {
    self.low
  }

  /// True if the value is zero.
  #[inline]
  pub const fn is_zero(&self) -> bool {
    self.high == 0 && self.low == 0
  }

  /// Addition, or `None` if the sum needs more than 128 bits.
  pub fn checked_add(self, rhs: Self) -> Option<Self> {
    let (low, carry) = self.low.overflowing_add(rhs.low);
    let (high, overflow_a) = self.high.overflowing_add(rhs.high);
    let (high, overflow_b) = high.overflowing_add(carry as u64);
    if overflow_a || overflow_b {
      None
    } else {
      Some(Self { high, low })
    }
  }

  /// Subtraction, or `None` if the result would be negative.
  pub fn checked_sub(self, rhs: Self) -> Option<Self> {
    if self < rhs {
      return None;
    }
    let (low, borrow) = self.low.overflowing_sub(rhs.low);
    // self >= rhs guarantees the high limb cannot underflow
    let high = self.high - rhs.high - borrow as u64;
    Some(Self { high, low })
  }

  /// Set bit `bit` (counted from the least significant bit) to one.
  ///
  /// # Panics
  /// If `bit >= 128`.
  pub fn set_bit(&mut self, bit: u32) {
    assert!(bit < LID_BITS, "bit index {bit} out of range for a linear id");
    if bit < 64 {
      self.low |= 1u64 << bit;
    } else {
      self.high |= 1u64 << (bit - 64);
    }
  }

  /// Read bit `bit`; bits at or above 128 read as zero.
  #[inline]
  pub fn bit(&self, bit: u32) -> bool {
    if bit < 64 {
      (self.low >> bit) & 1 == 1
    } else if bit < LID_BITS {
      (self.high >> (bit - 64)) & 1 == 1
    } else {
      false
    }
  }

  /// Number of significant bits (0 for zero).
  pub fn bit_len(&self) -> u32 {
    if self.high != 0 {
      LID_BITS - self.high.leading_zeros()
    } else {
      64 - self.low.leading_zeros()
    }
  }
}

impl From<u64> for LinearId {
  fn from(value: u64) -> Self {
    Self {
      high: 0,
      low: value,
    }
  }
}

impl AddAssign for LinearId {
  /// # Panics
  /// If the sum overflows 128 bits.
  fn add_assign(&mut self, rhs: Self) {
    *self = match self.checked_add(rhs) {
      Some(sum) => sum,
      None => panic!("linear id addition overflow: {self} + {rhs}"),
    };
  }
}

impl Add for LinearId {
  type Output = Self;

  fn add(mut self, rhs: Self) -> Self {
    self += rhs;
    self
  }
}

impl Sub for LinearId {
  type Output = Self;

  /// # Panics
  /// If `rhs > self`; callers must guarantee a non-negative result.
  fn sub(self, rhs: Self) -> Self {
    match self.checked_sub(rhs) {
      Some(diff) => diff,
      None => panic!("linear id subtraction underflow: {self} - {rhs}"),
    }
  }
}

impl SubAssign for LinearId {
  fn sub_assign(&mut self, rhs: Self) {
    *self = *self - rhs;
  }
}

impl BitAnd for LinearId {
  type Output = Self;

  fn bitand(self, rhs: Self) -> Self {
    Self {
      high: self.high & rhs.high,
      low: self.low & rhs.low,
    }
  }
}

impl BitOrAssign for LinearId {
  fn bitor_assign(&mut self, rhs: Self) {
    self.high |= rhs.high;
    self.low |= rhs.low;
  }
}

impl BitOr for LinearId {
  type Output = Self;

  fn bitor(mut self, rhs: Self) -> Self {
    self |= rhs;
    self
  }
}

impl Shr<u32> for LinearId {
  type Output = Self;

  /// Logical right shift; shifts of 128 or more give zero.
  fn shr(self, shift: u32) -> Self {
    match shift {
      0 => self,
      1..=63 => Self {
        high: self.high >> shift,
        low: (self.low >> shift) | (self.high << (64 - shift)),
      },
      64..=127 => Self {
        high: 0,
        low: self.high >> (shift - 64),
      },
      _ => Self::ZERO,
    }
  }
}

impl Shl<u32> for LinearId {
  type Output = Self;

  /// Logical left shift; shifts of 128 or more give zero.
  fn shl(self, shift: u32) -> Self {
    match shift {
      0 => self,
      1..=63 => Self {
        high: (self.high << shift) | (self.low >> (64 - shift)),
        low: self.low << shift,
      },
      64..=127 => Self {
        high: self.low << (shift - 64),
        low: 0,
      },
      _ => Self::ZERO,
    }
  }
}

impl fmt::Display for LinearId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.high == 0 {
      write!(f, "{:#x}", self.low)
    } else {
      write!(f, "{:#x}{:016x}", self.high, self.low)
    }
  }
}

impl fmt::Debug for LinearId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "LinearId({self})")
  }
}

#[cfg(test)]
#[path = "lid_test.rs"]
mod lid_test;
