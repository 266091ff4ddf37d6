//! The seams of the engine.
//!
//! Storage backends implement [`PaymentStore`]; persistence itself (SQL, KV, ...) is an external
//! collaborator — the engine only requires atomic, version-checked updates per record. Payment
//! routes implement [`ProviderAdapter`], and on-chain scanning sits behind [`ChainVerifier`] so
//! the orchestrator and tests never care which explorer answered.
mod payment_store;
mod providers;

pub use payment_store::{PaymentStore, PaymentStoreError};
pub use providers::{
    ChainVerifier,
    CurrencyInfo,
    FeeEstimate,
    IssuedInvoice,
    ProviderAdapter,
    ProviderError,
    StatusObservation,
};
