//! Monetary amounts.
//!
//! Amounts are stored as `i64` minor units (poisha for BDT) so arithmetic never
//! touches floating point. `Money` is the only type that crosses the wallet,
//! order and payment boundaries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An amount in minor currency units.
///
/// A `Money` value may be negative only as an intermediate result; wallet
/// balances and payment amounts are validated as non-negative before they are
/// persisted.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Major-unit decimal rendering with two fraction digits, as payment
    /// gateways expect it (`12345` -> `"123.45"`).
    pub fn to_decimal_string(self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        format!("{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal_string())
    }
}

impl std::ops::Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        Money(iter.map(|m| m.0).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_rendering() {
        assert_eq!(Money::from_minor(12345).to_decimal_string(), "123.45");
        assert_eq!(Money::from_minor(5).to_decimal_string(), "0.05");
        assert_eq!(Money::from_minor(-250).to_decimal_string(), "-2.50");
        assert_eq!(Money::ZERO.to_string(), "0.00");
    }

    #[test]
    fn checked_arithmetic_detects_overflow() {
        assert_eq!(Money::from_minor(i64::MAX).checked_add(Money::from_minor(1)), None);
        assert_eq!(
            Money::from_minor(500).checked_add(Money::from_minor(-200)),
            Some(Money::from_minor(300))
        );
    }

    #[test]
    fn serializes_as_plain_integer() {
        let json = serde_json::to_string(&Money::from_minor(500)).unwrap();
        assert_eq!(json, "500");
    }
}
