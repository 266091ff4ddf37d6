use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::record_types::{NewPaymentRecord, ObservationRefresh, OrderId, PaymentRecord, StatusTransition};

/// Storage contract for payment records.
///
/// The engine does not own persistence; it owns the rules. A conforming backend must provide:
/// * at most one *live* (non-terminal) record per order id — [`PaymentStore::insert`] fails with
///   [`PaymentStoreError::DuplicateOrder`] otherwise;
/// * atomic read-check-write on [`PaymentStore::apply_transition`] and
///   [`PaymentStore::refresh_observation`]: the update only lands when `expected_version` still
///   matches, so concurrent reconcilers cannot double-apply a transition;
/// * write-once `transaction_id`: a differing reassignment fails with
///   [`PaymentStoreError::TransactionIdReassignment`].
#[allow(async_fn_in_trait)]
pub trait PaymentStore: Clone + Send + Sync {
    async fn insert(&self, record: NewPaymentRecord) -> Result<PaymentRecord, PaymentStoreError>;

    async fn fetch_by_invoice_id(&self, invoice_id: &str) -> Result<Option<PaymentRecord>, PaymentStoreError>;

    /// The most recently issued record for the order, live or terminal.
    async fn fetch_by_order_id(&self, order_id: &OrderId) -> Result<Option<PaymentRecord>, PaymentStoreError>;

    /// Records still `pending` whose expiry stamp lies before `now`.
    async fn fetch_expired_candidates(&self, now: DateTime<Utc>) -> Result<Vec<PaymentRecord>, PaymentStoreError>;

    /// Apply a status transition, appending to the history and bumping the version.
    async fn apply_transition(
        &self,
        invoice_id: &str,
        expected_version: u64,
        transition: StatusTransition,
    ) -> Result<PaymentRecord, PaymentStoreError>;

    /// Update the volatile observation fields without recording a transition.
    async fn refresh_observation(
        &self,
        invoice_id: &str,
        expected_version: u64,
        refresh: ObservationRefresh,
    ) -> Result<PaymentRecord, PaymentStoreError>;
}

#[derive(Debug, Clone, Error)]
pub enum PaymentStoreError {
    #[error("A live payment record already exists for order {0}")]
    DuplicateOrder(OrderId),
    #[error("No payment record found for {0}")]
    RecordNotFound(String),
    #[error("Stale version for invoice {invoice_id}: expected {expected}, found {actual}")]
    VersionConflict { invoice_id: String, expected: u64, actual: u64 },
    #[error("Invoice {invoice_id} is already credited to transaction {existing}; refusing to reassign to {attempted}")]
    TransactionIdReassignment { invoice_id: String, existing: String, attempted: String },
    #[error("Storage backend error: {0}")]
    Backend(String),
}
