//! The bundled payment routes: wrappers over the hosted invoicing clients, and the manual
//! on-chain wallet route.
mod btcpay;
mod manual;
mod nowpayments;

pub use btcpay::BtcPayAdapter;
pub use manual::{ManualAdapter, WalletConfig, MANUAL_INVOICE_EXPIRY};
pub use nowpayments::NowPaymentsAdapter;
