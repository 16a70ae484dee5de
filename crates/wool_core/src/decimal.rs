//! Arbitrary-precision decimal math for resource quantities.
//!
//! Wool counts in a late game run far past what `f64` (or any fixed-width
//! decimal) can hold exactly, so every quantity in the core is an [`Amount`]
//! backed by [`BigDecimal`]. Amounts always cross serialization boundaries as
//! base-10 strings, never as native floats.
//!
//! Fractions that stay inside `0..=1` (data-loss estimates) use the
//! fixed-point [`Fraction`] type instead.

use std::fmt;
use std::ops::{Add, AddAssign, Mul, MulAssign, Sub};
use std::str::FromStr;

use bigdecimal::{BigDecimal, One, RoundingMode, Signed, ToPrimitive, Zero};
use fixed::types::I32F32;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, WoolError};

/// Significant digits kept after each multiplication.
///
/// Products of long geometric series would otherwise grow without bound
/// (`1.15^10000` has tens of thousands of digits).
pub const PRECISION: u64 = 64;

/// Largest exponent accepted in scientific notation.
///
/// Far above any sane ceiling; `1e30000000` would otherwise expand to
/// thirty million digits when written out.
pub const MAX_EXPONENT: u64 = 1_000;

/// Fixed-point fraction for bounded ratios such as estimated data loss.
pub type Fraction = I32F32;

/// An arbitrary-precision, non-float resource quantity.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(BigDecimal);

impl Amount {
    /// Zero.
    #[must_use]
    pub fn zero() -> Self {
        Self(BigDecimal::zero())
    }

    /// One.
    #[must_use]
    pub fn one() -> Self {
        Self(BigDecimal::one())
    }

    /// Build an amount from an integer.
    #[must_use]
    pub fn from_int(value: i64) -> Self {
        Self(BigDecimal::from(value))
    }

    /// Build `numerator / denominator` exactly for small ratios like `1/10`.
    ///
    /// Returns `None` when the denominator is zero.
    #[must_use]
    pub fn ratio(numerator: i64, denominator: i64) -> Option<Self> {
        Self::from_int(numerator).checked_div(&Self::from_int(denominator))
    }

    /// `mantissa × 10^-scale`, e.g. `scaled(115, 2)` is `1.15`.
    #[must_use]
    pub fn scaled(mantissa: i64, scale: i64) -> Self {
        Self(BigDecimal::new(mantissa.into(), scale))
    }

    /// `10^exponent`, e.g. the `1e100` sanity ceiling.
    #[must_use]
    pub fn power_of_ten(exponent: i64) -> Self {
        Self(BigDecimal::new(1.into(), -exponent))
    }

    /// Parse a base-10 string (plain or scientific notation).
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(WoolError::InvalidAmount(text.to_string()));
        }
        if let Some(position) = trimmed.find(|c| c == 'e' || c == 'E') {
            let exponent = trimmed[position + 1..]
                .parse::<i64>()
                .map_err(|_| WoolError::InvalidAmount(text.to_string()))?;
            if exponent.unsigned_abs() > MAX_EXPONENT {
                return Err(WoolError::InvalidAmount(text.to_string()));
            }
        }
        BigDecimal::from_str(trimmed)
            .map(Self)
            .map_err(|_| WoolError::InvalidAmount(text.to_string()))
    }

    /// Whether the amount is exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Whether the amount is strictly below zero.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    /// Whether the amount has no fractional part.
    #[must_use]
    pub fn is_integer(&self) -> bool {
        self.0.is_integer()
    }

    /// Subtract, clamping the result at zero.
    #[must_use]
    pub fn saturating_sub(&self, rhs: &Self) -> Self {
        let result = &self.0 - &rhs.0;
        if result.is_negative() {
            Self::zero()
        } else {
            Self(result)
        }
    }

    /// Divide, returning `None` on a zero divisor.
    #[must_use]
    pub fn checked_div(&self, rhs: &Self) -> Option<Self> {
        if rhs.is_zero() {
            None
        } else {
            Some(Self((&self.0 / &rhs.0).with_prec(PRECISION)))
        }
    }

    /// Raise to a non-negative integer power by repeated squaring.
    #[must_use]
    pub fn pow(&self, exponent: u32) -> Self {
        let mut result = BigDecimal::one();
        let mut base = self.0.clone();
        let mut remaining = exponent;
        while remaining > 0 {
            if remaining & 1 == 1 {
                result = (result * &base).with_prec(PRECISION);
            }
            remaining >>= 1;
            if remaining > 0 {
                base = (&base * &base).with_prec(PRECISION);
            }
        }
        Self(result)
    }

    /// Multiply by a whole count (seconds, levels).
    #[must_use]
    pub fn mul_count(&self, count: u64) -> Self {
        Self(&self.0 * BigDecimal::from(count))
    }

    /// Round towards negative infinity to a whole number.
    #[must_use]
    pub fn floor(&self) -> Self {
        Self(self.0.with_scale_round(0, RoundingMode::Floor))
    }

    /// Larger of two amounts, by reference.
    #[must_use]
    pub fn max_of<'a>(&'a self, other: &'a Self) -> &'a Self {
        if other > self {
            other
        } else {
            self
        }
    }

    /// Clamp into `[min, max]`.
    #[must_use]
    pub fn clamp_to(&self, min: &Self, max: &Self) -> Self {
        if self < min {
            min.clone()
        } else if self > max {
            max.clone()
        } else {
            self.clone()
        }
    }

    /// Convert to `u64` if the value is a non-negative integer in range.
    #[must_use]
    pub fn to_u64(&self) -> Option<u64> {
        if self.is_integer() {
            self.0.to_u64()
        } else {
            None
        }
    }

    /// Canonical base-10 string: integers without a fractional part,
    /// decimals without trailing zeros.
    #[must_use]
    pub fn to_canonical_string(&self) -> String {
        if self.0.is_integer() {
            self.0.with_scale(0).to_string()
        } else {
            self.0.normalized().to_string()
        }
    }
}

impl Default for Amount {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({})", self.to_canonical_string())
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical_string())
    }
}

impl FromStr for Amount {
    type Err = WoolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(BigDecimal::from(value))
    }
}

impl From<u32> for Amount {
    fn from(value: u32) -> Self {
        Self(BigDecimal::from(value))
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Self::from_int(value)
    }
}

impl Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl<'a> Add<&'a Amount> for &'a Amount {
    type Output = Amount;

    fn add(self, rhs: &'a Amount) -> Self::Output {
        Amount(&self.0 + &rhs.0)
    }
}

impl AddAssign<&Amount> for Amount {
    fn add_assign(&mut self, rhs: &Amount) {
        self.0 += &rhs.0;
    }
}

impl Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl<'a> Sub<&'a Amount> for &'a Amount {
    type Output = Amount;

    fn sub(self, rhs: &'a Amount) -> Self::Output {
        Amount(&self.0 - &rhs.0)
    }
}

impl Mul for Amount {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Self((self.0 * rhs.0).with_prec(PRECISION))
    }
}

impl<'a> Mul<&'a Amount> for &'a Amount {
    type Output = Amount;

    fn mul(self, rhs: &'a Amount) -> Self::Output {
        Amount((&self.0 * &rhs.0).with_prec(PRECISION))
    }
}

impl MulAssign<&Amount> for Amount {
    fn mul_assign(&mut self, rhs: &Amount) {
        self.0 = (&self.0 * &rhs.0).with_prec(PRECISION);
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), Add::add)
    }
}

impl<'a> std::iter::Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, x| &acc + x)
    }
}

impl std::iter::Product for Amount {
    fn product<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::one(), Mul::mul)
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_canonical_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct AmountVisitor;

        impl serde::de::Visitor<'_> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a base-10 decimal string or an integer")
            }

            fn visit_str<E>(self, v: &str) -> std::result::Result<Amount, E>
            where
                E: serde::de::Error,
            {
                Amount::parse(v).map_err(E::custom)
            }

            fn visit_i64<E>(self, v: i64) -> std::result::Result<Amount, E>
            where
                E: serde::de::Error,
            {
                Ok(Amount::from_int(v))
            }

            fn visit_u64<E>(self, v: u64) -> std::result::Result<Amount, E>
            where
                E: serde::de::Error,
            {
                Ok(Amount::from(v))
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

/// Serde support for [`Fraction`].
///
/// Fractions are written as decimal strings so JSON reports stay readable.
pub mod fraction_serde {
    use super::Fraction;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    /// Serialize a fraction as its decimal string.
    pub fn serialize<S>(value: &Fraction, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    /// Deserialize a fraction from its decimal string.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fraction, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        Fraction::from_str(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amt(s: &str) -> Amount {
        Amount::parse(s).unwrap()
    }

    #[test]
    fn test_parse_and_canonical_string() {
        assert_eq!(amt("150").to_canonical_string(), "150");
        assert_eq!(amt("0.500").to_canonical_string(), "0.5");
        assert_eq!(amt("432000.0").to_canonical_string(), "432000");
        assert!(Amount::parse("NaN").is_err());
        assert!(Amount::parse("").is_err());
        assert!(Amount::parse("twelve").is_err());
        assert!(Amount::parse("1e30000000").is_err());
        assert!(Amount::parse("1E-30000000").is_err());
        assert_eq!(Amount::parse("1e+3").unwrap(), Amount::from_int(1_000));
        assert!(Amount::parse("1e1000").is_ok());
    }

    #[test]
    fn test_large_magnitudes_stay_exact() {
        let big = Amount::power_of_ten(100);
        let bigger = &big + &Amount::one();
        assert!(bigger > big);
        assert_eq!(&bigger - &big, Amount::one());
        assert_eq!(amt("1e100"), big);
    }

    #[test]
    fn test_pow_matches_repeated_multiplication() {
        let base = amt("1.15");
        let mut expected = Amount::one();
        for _ in 0..7 {
            expected = &expected * &base;
        }
        assert_eq!(base.pow(7), expected);
        assert_eq!(base.pow(0), Amount::one());
    }

    #[test]
    fn test_zero_times_anything_is_exact_zero() {
        let rate = Amount::zero();
        let earned = (&rate * &amt("0.5")).mul_count(86_400);
        assert!(earned.is_zero());
        assert_eq!(earned.to_canonical_string(), "0");
    }

    #[test]
    fn test_saturating_sub_and_div() {
        assert_eq!(amt("5").saturating_sub(&amt("7")), Amount::zero());
        assert_eq!(amt("7").saturating_sub(&amt("5")), amt("2"));
        assert_eq!(Amount::ratio(1, 10), Some(amt("0.1")));
        assert_eq!(Amount::scaled(115, 2), amt("1.15"));
        assert!(amt("1").checked_div(&Amount::zero()).is_none());
    }

    #[test]
    fn test_serde_round_trip_as_string() {
        let value = amt("123456789012345678901234567890.25");
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, "\"123456789012345678901234567890.25\"");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_floor_and_integer_checks() {
        assert_eq!(amt("12.9").floor(), amt("12"));
        assert!(amt("12").is_integer());
        assert_eq!(amt("42").to_u64(), Some(42));
        assert_eq!(amt("-1").to_u64(), None);
    }
}
