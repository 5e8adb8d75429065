use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const IDR_CURRENCY_CODE: &str = "IDR";
pub const IDR_CURRENCY_CODE_LOWER: &str = "idr";

//--------------------------------------      Rupiah        ----------------------------------------------------------

/// An amount of Indonesian Rupiah, in whole rupiah (IDR carries no sub-units in practice).
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Rupiah(i64);

op!(binary Rupiah, Add, add);
op!(binary Rupiah, Sub, sub);
op!(inplace Rupiah, AddAssign, add_assign);
op!(inplace Rupiah, SubAssign, sub_assign);
op!(unary Rupiah, Neg, neg);

impl Mul<i64> for Rupiah {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Rupiah {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in Rupiah: {0}")]
pub struct RupiahConversionError(String);

impl From<i64> for Rupiah {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Rupiah {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Rupiah {}

impl TryFrom<u64> for Rupiah {
    type Error = RupiahConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(RupiahConversionError(format!("Value {} is too large to convert to Rupiah", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Rupiah {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Rp{}", self.0)
    }
}

impl Rupiah {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// The absolute difference between two amounts, used for mismatch-tolerance checks.
    pub fn abs_diff(&self, other: Rupiah) -> Rupiah {
        Rupiah((self.0 - other.0).abs())
    }

    /// Parses a provider-formatted decimal amount such as `"100000.00"` or `"100000"`.
    ///
    /// Providers report IDR with two (always-zero) decimal places; anything other than zero
    /// cents is rejected rather than silently truncated.
    pub fn from_provider_amount(s: &str) -> Result<Self, RupiahConversionError> {
        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if !frac.is_empty() && !frac.chars().all(|c| c == '0') {
            return Err(RupiahConversionError(format!("Fractional rupiah amounts are not supported: {s}")));
        }
        whole.parse::<i64>().map(Rupiah).map_err(|e| RupiahConversionError(format!("{s} is not a valid amount: {e}")))
    }

    /// Formats the amount the way SNAP-style APIs expect it (`"100000.00"`).
    pub fn to_provider_amount(&self) -> String {
        format!("{}.00", self.0)
    }
}
