//! 128-bit decimal value type.
use crate::{Error, Result};

const SCALE_SHIFT: u32 = 16;
const SCALE_MASK: u32 = 0x00FF_0000;
const SIGN_MASK: u32 = 0x8000_0000;
const MAX_SCALE: u8 = 28;

/// A 128-bit decimal: a 96-bit unsigned magnitude held in three 32-bit
/// words, a sign bit, and a decimal scale in `0..=28`.
///
/// The numeric value is `(-1)^sign * (hi * 2^64 + mid * 2^32 + lo) / 10^scale`.
/// The packed word layout matches the wire decomposition exactly, so
/// round-trips of extreme values are bit-exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Decimal {
    flags: u32,
    lo: u32,
    mid: u32,
    hi: u32,
}

impl Decimal {
    /// Zero, with scale 0.
    pub const ZERO: Decimal = Decimal {
        flags: 0,
        lo: 0,
        mid: 0,
        hi: 0,
    };

    /// The largest representable value: the full 96-bit magnitude, scale 0.
    pub const MAX: Decimal = Decimal {
        flags: 0,
        lo: u32::MAX,
        mid: u32::MAX,
        hi: u32::MAX,
    };

    /// The smallest representable value: `-MAX`.
    pub const MIN: Decimal = Decimal {
        flags: SIGN_MASK,
        lo: u32::MAX,
        mid: u32::MAX,
        hi: u32::MAX,
    };

    /// Builds a decimal from its magnitude words, sign and scale.
    ///
    /// Fails with [`Error::ScalarOutOfRange`] when `scale` exceeds 28.
    pub fn from_parts(lo: u32, mid: u32, hi: u32, negative: bool, scale: u8) -> Result<Self> {
        if scale > MAX_SCALE {
            return Err(Error::ScalarOutOfRange("decimal scale exceeds 28"));
        }

        let mut flags = u32::from(scale) << SCALE_SHIFT;
        if negative {
            flags |= SIGN_MASK;
        }

        Ok(Self { flags, lo, mid, hi })
    }

    /// Reassembles a decimal from its four wire words, sign/scale word first.
    ///
    /// Fails when the flags word uses reserved bits or an out-of-range scale.
    pub fn from_words(words: [u32; 4]) -> Result<Self> {
        let [flags, lo, mid, hi] = words;
        if flags & !(SCALE_MASK | SIGN_MASK) != 0 {
            return Err(Error::ScalarOutOfRange("decimal flags use reserved bits"));
        }

        let scale = ((flags & SCALE_MASK) >> SCALE_SHIFT) as u8;
        if scale > MAX_SCALE {
            return Err(Error::ScalarOutOfRange("decimal scale exceeds 28"));
        }

        Ok(Self { flags, lo, mid, hi })
    }

    /// The four wire words, sign/scale word first, then the magnitude words
    /// from least to most significant.
    pub fn words(&self) -> [u32; 4] {
        [self.flags, self.lo, self.mid, self.hi]
    }

    /// Low magnitude word.
    pub fn lo(&self) -> u32 {
        self.lo
    }

    /// Middle magnitude word.
    pub fn mid(&self) -> u32 {
        self.mid
    }

    /// High magnitude word.
    pub fn hi(&self) -> u32 {
        self.hi
    }

    /// Decimal scale, the power of ten the magnitude is divided by.
    pub fn scale(&self) -> u8 {
        ((self.flags & SCALE_MASK) >> SCALE_SHIFT) as u8
    }

    /// Whether the value is negative.
    pub fn is_negative(&self) -> bool {
        self.flags & SIGN_MASK != 0
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        let magnitude = value.unsigned_abs();
        let mut flags = 0;
        if value < 0 {
            flags = SIGN_MASK;
        }

        Self {
            flags,
            lo: magnitude as u32,
            mid: (magnitude >> 32) as u32,
            hi: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_roundtrip_through_words() -> Result<()> {
        let value = Decimal::from_parts(0xDEAD_BEEF, 0x0123_4567, 0x89AB_CDEF, true, 15)?;
        let rebuilt = Decimal::from_words(value.words())?;

        assert_eq!(rebuilt, value);
        assert!(rebuilt.is_negative());
        assert_eq!(rebuilt.scale(), 15);

        Ok(())
    }

    #[test]
    fn extremes_are_bit_exact() -> Result<()> {
        for value in [Decimal::ZERO, Decimal::MAX, Decimal::MIN] {
            assert_eq!(Decimal::from_words(value.words())?, value);
        }

        Ok(())
    }

    #[test]
    fn scale_is_bounded() {
        assert!(Decimal::from_parts(1, 0, 0, false, 29).is_err());
        assert!(Decimal::from_words([0x0100_0000, 0, 0, 0]).is_err());
    }

    #[test]
    fn from_i64_keeps_sign_and_magnitude() {
        let value = Decimal::from(-42);
        assert!(value.is_negative());
        assert_eq!(value.lo(), 42);
        assert_eq!(value.scale(), 0);

        let value = Decimal::from(i64::MIN);
        assert_eq!(value.lo(), 0);
        assert_eq!(value.mid(), 0x8000_0000);
    }
}
