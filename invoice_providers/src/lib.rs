//! Clients for the hosted invoicing services the gateway can issue payment requests against.
//!
//! Each provider speaks its own status vocabulary. The vocabularies are modelled as enums with a
//! catch-all `Unknown` variant, and each carries a fixed `canonical()` table onto the shared
//! [`cpg_common::PaymentStatus`] lifecycle. An unmapped upstream value therefore surfaces as
//! `unknown` for manual review instead of being guessed at.
mod btcpay;
mod config;
mod error;
mod helpers;
mod nowpayments;

pub use btcpay::{BtcPayApi, BtcPayCryptoInfo, BtcPayInvoice, BtcPayInvoiceStatus, BtcPayStatus};
pub use config::{BtcPayConfig, NowPaymentsConfig};
pub use error::ProviderApiError;
pub use nowpayments::{NowPaymentsApi, NowPaymentsEstimate, NowPaymentsInvoice, NowPaymentsInvoiceStatus, NowPaymentsStatus};
