use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};

/// Monetary amount in minor currency units (cents).
///
/// Currency is whatever the workspace bills in; no conversion happens here.
/// Negative values are legal: refunds and net-negative balances both need them.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Whole currency units, e.g. `Money::from_major(100)` is 100.00.
    pub const fn from_major(units: i64) -> Self {
        Money(units * 100)
    }

    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Amount in major units as a float, for multiplier math and averages.
    pub fn as_major(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn abs(&self) -> Self {
        Money(self.0.abs())
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(self.0.saturating_neg())
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.copied().sum()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_sum_with_refunds() {
        let amounts = [Money::from_major(100), Money::from_cents(-2550), Money::from_major(10)];
        let total: Money = amounts.iter().sum();
        assert_eq!(total, Money::from_cents(8450));
        assert_eq!(total.to_string(), "84.50");
    }

    #[test]
    fn test_money_negative_display() {
        let m = Money::from_cents(-105);
        assert!(m.is_negative());
        assert_eq!(m.to_string(), "-1.05");
        assert_eq!(m.abs(), Money::from_cents(105));
    }

    #[test]
    fn test_money_serializes_as_integer() {
        let json = serde_json::to_string(&Money::from_major(12)).unwrap();
        assert_eq!(json, "1200");
        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_major(), 12.0);
    }
}
