//! The in-memory reference implementation of [`PaymentStore`].
//!
//! Durable persistence belongs to the embedding application; this backend exists so the engine
//! and its tests have a conforming store, and it documents by example what the trait demands:
//! uniqueness of live records per order, version-checked updates, and write-once transaction
//! attribution.
use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use cpg_common::PaymentStatus;
use log::*;
use tokio::sync::RwLock;

use crate::{
    record_types::{NewPaymentRecord, ObservationRefresh, OrderId, PaymentRecord, StatusEntry, StatusTransition},
    traits::{PaymentStore, PaymentStoreError},
};

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, PaymentRecord>,
    /// order id -> invoice id of the most recently issued record for that order.
    order_index: HashMap<OrderId, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PaymentStore for MemoryStore {
    async fn insert(&self, record: NewPaymentRecord) -> Result<PaymentRecord, PaymentStoreError> {
        let mut inner = self.inner.write().await;
        if let Some(invoice_id) = inner.order_index.get(&record.order_id) {
            if let Some(existing) = inner.records.get(invoice_id) {
                if !existing.is_terminal() {
                    return Err(PaymentStoreError::DuplicateOrder(record.order_id));
                }
            }
        }
        let now = record.created_at;
        let full = PaymentRecord {
            id: record.id,
            order_id: record.order_id.clone(),
            invoice_id: record.invoice_id.clone(),
            provider: record.provider,
            currency: record.currency,
            expected_amount: record.expected_amount,
            address: record.address,
            status: PaymentStatus::Pending,
            transaction_id: None,
            amount_paid: None,
            confirmations: None,
            payment_url: record.payment_url,
            description: record.description,
            instructions: record.instructions,
            created_at: now,
            updated_at: now,
            expires_at: record.expires_at,
            status_history: vec![StatusEntry {
                status: PaymentStatus::Pending,
                timestamp: now,
                source: crate::record_types::StatusSource::Provider(record.provider),
            }],
            version: 1,
        };
        inner.order_index.insert(record.order_id, record.invoice_id.clone());
        inner.records.insert(record.invoice_id, full.clone());
        Ok(full)
    }

    async fn fetch_by_invoice_id(&self, invoice_id: &str) -> Result<Option<PaymentRecord>, PaymentStoreError> {
        let inner = self.inner.read().await;
        Ok(inner.records.get(invoice_id).cloned())
    }

    async fn fetch_by_order_id(&self, order_id: &OrderId) -> Result<Option<PaymentRecord>, PaymentStoreError> {
        let inner = self.inner.read().await;
        Ok(inner.order_index.get(order_id).and_then(|invoice_id| inner.records.get(invoice_id)).cloned())
    }

    async fn fetch_expired_candidates(&self, now: DateTime<Utc>) -> Result<Vec<PaymentRecord>, PaymentStoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .values()
            .filter(|r| r.status == PaymentStatus::Pending && r.is_expired_at(now))
            .cloned()
            .collect())
    }

    async fn apply_transition(
        &self,
        invoice_id: &str,
        expected_version: u64,
        transition: StatusTransition,
    ) -> Result<PaymentRecord, PaymentStoreError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .records
            .get_mut(invoice_id)
            .ok_or_else(|| PaymentStoreError::RecordNotFound(invoice_id.to_string()))?;
        if record.version != expected_version {
            return Err(PaymentStoreError::VersionConflict {
                invoice_id: invoice_id.to_string(),
                expected: expected_version,
                actual: record.version,
            });
        }
        if let (Some(existing), Some(attempted)) = (record.transaction_id.as_deref(), transition.transaction_id.as_deref())
        {
            if existing != attempted {
                return Err(PaymentStoreError::TransactionIdReassignment {
                    invoice_id: invoice_id.to_string(),
                    existing: existing.to_string(),
                    attempted: attempted.to_string(),
                });
            }
        }
        trace!("💾️ {invoice_id}: {} -> {} (v{})", record.status, transition.new_status, record.version + 1);
        record.status = transition.new_status;
        if record.transaction_id.is_none() {
            record.transaction_id = transition.transaction_id.clone();
        }
        if transition.amount_paid.is_some() {
            record.amount_paid = transition.amount_paid;
        }
        if transition.confirmations.is_some() {
            record.confirmations = transition.confirmations;
        }
        record.updated_at = transition.timestamp;
        record.status_history.push(StatusEntry {
            status: transition.new_status,
            timestamp: transition.timestamp,
            source: transition.source,
        });
        record.version += 1;
        Ok(record.clone())
    }

    async fn refresh_observation(
        &self,
        invoice_id: &str,
        expected_version: u64,
        refresh: ObservationRefresh,
    ) -> Result<PaymentRecord, PaymentStoreError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .records
            .get_mut(invoice_id)
            .ok_or_else(|| PaymentStoreError::RecordNotFound(invoice_id.to_string()))?;
        if record.version != expected_version {
            return Err(PaymentStoreError::VersionConflict {
                invoice_id: invoice_id.to_string(),
                expected: expected_version,
                actual: record.version,
            });
        }
        if refresh.amount_paid.is_some() {
            record.amount_paid = refresh.amount_paid;
        }
        if refresh.confirmations.is_some() {
            record.confirmations = refresh.confirmations;
        }
        record.updated_at = refresh.timestamp;
        record.version += 1;
        Ok(record.clone())
    }
}
