use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{de::Error as DeError, Deserialize, Deserializer, Serialize, Serializer};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const DEFAULT_CURRENCY: &str = "EUR";

//--------------------------------------       Money         ---------------------------------------------------------
/// An amount of money in minor units (cents).
///
/// All monetary arithmetic in the engine happens on this type, in integer cents, with rounding applied half-up at the
/// cent boundary. This is what makes order totals reproducible bit-for-bit from the stored order fields: there is no
/// float anywhere in the money path.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Whole currency units, e.g. `Money::from_major(10)` is 10.00.
    pub fn from_major(units: i64) -> Self {
        Self(units * 100)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Negative amounts clamp to zero. Used when clipping discounts.
    pub fn clamp_non_negative(self) -> Self {
        Self(self.0.max(0))
    }

    /// Take `pct` percent of this amount, rounding half-up at the cent boundary.
    pub fn percent(self, pct: u32) -> Self {
        Self(div_round_half_up(i128::from(self.0) * i128::from(pct), 100))
    }

    /// Apply a rate expressed in basis points (1/100th of a percent), rounding half-up.
    /// A 20% tax rate is 2000 basis points.
    pub fn basis_points(self, bps: u32) -> Self {
        Self(div_round_half_up(i128::from(self.0) * i128::from(bps), 10_000))
    }
}

/// Round-half-up division, i.e. `floor(n/d + 1/2)`. `d` must be positive.
fn div_round_half_up(n: i128, d: i128) -> i64 {
    let q = (2 * n + d).div_euclid(2 * d);
    #[allow(clippy::cast_possible_truncation)]
    {
        q as i64
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Not a valid monetary amount: {0}")]
pub struct MoneyParseError(String);

impl FromStr for Money {
    type Err = MoneyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (sign, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (-1i64, rest),
            None => (1i64, trimmed),
        };
        let (major_str, frac_str) = match digits.split_once('.') {
            Some((m, f)) => (m, f),
            None => (digits, ""),
        };
        if major_str.is_empty() || frac_str.len() > 2 {
            return Err(MoneyParseError(s.to_string()));
        }
        let major: i64 = major_str.parse().map_err(|_| MoneyParseError(s.to_string()))?;
        let frac: i64 = if frac_str.is_empty() {
            0
        } else {
            let padded = format!("{frac_str:0<2}");
            padded.parse().map_err(|_| MoneyParseError(s.to_string()))?
        };
        Ok(Self(sign * (major * 100 + frac)))
    }
}

// Monetary fields are serialized as decimal strings with exactly two fraction digits.
impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(DeError::custom)
    }
}
