//! Fixed-precision monetary amounts.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when monetary arithmetic leaves the representable range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("monetary amount out of range")]
pub struct MoneyOverflow;

/// A monetary amount backed by a 96-bit decimal.
///
/// Amounts never pass through binary floating point. They serialize as
/// decimal strings (`"100.00"`) and accept either strings or JSON numbers on
/// input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Wraps a decimal value.
    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Creates an amount from minor units, e.g. `from_minor(5000)` is `50.00`.
    pub fn from_minor(minor: i64) -> Self {
        Self(Decimal::new(minor, 2))
    }

    /// Returns the underlying decimal.
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns true if the amount has no fraction finer than a cent.
    pub fn is_whole_cents(&self) -> bool {
        self.0.normalize().scale() <= 2
    }

    /// Returns true if the amount is zero, regardless of scale.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the amount is strictly negative.
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Adds two amounts.
    pub fn checked_add(&self, other: Money) -> Result<Money, MoneyOverflow> {
        self.0.checked_add(other.0).map(Money).ok_or(MoneyOverflow)
    }

    /// Multiplies a unit price by a quantity.
    pub fn checked_mul(&self, quantity: u32) -> Result<Money, MoneyOverflow> {
        self.0
            .checked_mul(Decimal::from(quantity))
            .map(Money)
            .ok_or(MoneyOverflow)
    }

    /// Sums an iterator of amounts.
    pub fn checked_sum<I>(amounts: I) -> Result<Money, MoneyOverflow>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, amount| acc.checked_add(amount))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim()).map(Money)
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}
