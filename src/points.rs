use std::fmt;

use serde::{Deserialize, Serialize};

/// A whole number of points. Balances and stakes are never fractional and
/// never negative.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Points(u64);

impl Points {
    pub const ZERO: Points = Points(0);

    pub fn new(value: u64) -> Self {
        Points(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Both escrowed stakes of a wager combined.
    pub fn doubled(self) -> Option<Self> {
        self.0.checked_mul(2).map(Points)
    }

    /// Apply a signed delta, returning `None` if the result would be negative
    /// or overflow.
    pub fn checked_apply(self, delta: i64) -> Option<Self> {
        if delta >= 0 {
            self.0.checked_add(delta.unsigned_abs()).map(Points)
        } else {
            self.0.checked_sub(delta.unsigned_abs()).map(Points)
        }
    }

    /// Signed delta that debits this many points.
    pub fn as_debit(self) -> i64 {
        -(self.0.min(i64::MAX as u64) as i64)
    }

    /// Signed delta that credits this many points.
    pub fn as_credit(self) -> i64 {
        self.0.min(i64::MAX as u64) as i64
    }
}

impl From<u64> for Points {
    fn from(value: u64) -> Self {
        Points(value)
    }
}

impl fmt::Display for Points {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
