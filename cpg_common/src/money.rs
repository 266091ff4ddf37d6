use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Sub},
    str::FromStr,
};

use rust_decimal::{prelude::FromPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use thiserror::Error;

//--------------------------------------        Money        ---------------------------------------------------------
/// A fixed-point currency amount in human units (BTC, USDT, ...).
///
/// Amounts are never represented as floats. Raw on-chain integer values are converted with
/// [`Money::from_base_units`] using the currency's decimal exponent, and wire-level floats from
/// provider JSON go through the fallible [`Money::from_f64`] at the boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a money amount: {0}")]
pub struct MoneyConversionError(pub String);

/// Raw base-unit values must fit in the 96-bit decimal mantissa.
const MAX_BASE_UNITS: u128 = 1 << 96;

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Scale an integer base-unit amount (satoshis, token base units) down by `decimals`.
    pub fn from_base_units(raw: u128, decimals: u32) -> Result<Self, MoneyConversionError> {
        if raw >= MAX_BASE_UNITS {
            return Err(MoneyConversionError(format!("base unit value {raw} exceeds the 96-bit mantissa")));
        }
        #[allow(clippy::cast_possible_wrap)]
        Ok(Self(Decimal::from_i128_with_scale(raw as i128, decimals)))
    }

    /// Convert a wire-level float (provider JSON) into an exact amount.
    pub fn from_f64(value: f64) -> Result<Self, MoneyConversionError> {
        Decimal::from_f64(value)
            .map(Self)
            .ok_or_else(|| MoneyConversionError(format!("{value} is not a representable amount")))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(Decimal::from(value))
    }
}

impl FromStr for Money {
    type Err = MoneyConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s).map(Self).map_err(|e| MoneyConversionError(format!("{s}: {e}")))
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}
