use std::fmt::Display;

use chrono::{DateTime, Utc};
use cpg_common::PaymentStatus;
use serde::{Deserialize, Serialize};

use crate::record_types::{OrderId, PaymentRecord, RecordId};

//--------------------------------------      AuditAction      -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A new invoice was issued.
    Issue,
    /// A status transition driven by reconciliation.
    StatusChange,
    /// Admin override straight to `completed`.
    ForceConfirm,
    /// Admin cancellation.
    Cancel,
    /// An existing order was explicitly re-invoiced.
    Reissue,
    /// The expiry sweep retired an overdue invoice.
    Expire,
    /// An observation conflicted with an invariant and was not applied.
    AnomalyDetected,
}

impl Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditAction::Issue => "issue",
            AuditAction::StatusChange => "status_change",
            AuditAction::ForceConfirm => "force_confirm",
            AuditAction::Cancel => "cancel",
            AuditAction::Reissue => "reissue",
            AuditAction::Expire => "expire",
            AuditAction::AnomalyDetected => "anomaly_detected",
        };
        write!(f, "{s}")
    }
}

//--------------------------------------      AuditEvent       -------------------------------------------------------
/// Emitted for every state transition, every administrative action and every detected anomaly.
/// The orchestrator publishes these unconditionally; the external audit collaborator subscribes
/// through the hook system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub actor: String,
    pub action: AuditAction,
    pub record_id: RecordId,
    pub invoice_id: String,
    pub order_id: OrderId,
    pub old_status: Option<PaymentStatus>,
    pub new_status: Option<PaymentStatus>,
    pub note: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn for_record(record: &PaymentRecord, actor: &str, action: AuditAction) -> Self {
        Self {
            actor: actor.to_string(),
            action,
            record_id: record.id.clone(),
            invoice_id: record.invoice_id.clone(),
            order_id: record.order_id.clone(),
            old_status: None,
            new_status: Some(record.status),
            note: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_old_status(mut self, status: PaymentStatus) -> Self {
        self.old_status = Some(status);
        self
    }

    pub fn with_note<S: Into<String>>(mut self, note: S) -> Self {
        self.note = Some(note.into());
        self
    }
}

//--------------------------------------  PaymentCompletedEvent ------------------------------------------------------
/// Fired once when a record reaches `completed`, for fulfilment hooks (granting the
/// subscription, notifying the user, ...).
#[derive(Debug, Clone)]
pub struct PaymentCompletedEvent {
    pub record: PaymentRecord,
}

impl PaymentCompletedEvent {
    pub fn new(record: PaymentRecord) -> Self {
        Self { record }
    }
}
