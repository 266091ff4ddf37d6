//! Common types shared across the crypto payment gateway crates.
//!
//! This crate is a leaf dependency. It holds the value objects that every other crate agrees on:
//! fixed-point money, the supported currencies and their networks, the canonical payment lifecycle
//! vocabulary, and a redacting wrapper for credentials.
mod currency;
mod money;
mod secret;
mod status;

pub use currency::{CryptoCurrency, CurrencyParseError, Network};
pub use money::{Money, MoneyConversionError};
pub use secret::Secret;
pub use status::{PaymentProvider, PaymentStatus, StatusParseError};
