use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use cpg_common::{CryptoCurrency, Money, Network, PaymentProvider, PaymentStatus};
use serde::{Deserialize, Serialize};

//--------------------------------------        OrderId        -------------------------------------------------------
/// The caller-supplied correlation key linking an invoice to an order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------       RecordId        -------------------------------------------------------
/// Opaque identifier of a payment record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------     StatusSource      -------------------------------------------------------
/// Where a status transition came from. Part of the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusSource {
    /// Reported by a hosted invoicing provider.
    Provider(PaymentProvider),
    /// Observed by scanning the chain directly.
    ChainScan(Network),
    /// An administrative action; carries the acting identity.
    Admin(String),
}

impl Display for StatusSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusSource::Provider(p) => write!(f, "provider:{p}"),
            StatusSource::ChainScan(n) => write!(f, "chain:{n}"),
            StatusSource::Admin(actor) => write!(f, "admin:{actor}"),
        }
    }
}

//--------------------------------------      StatusEntry      -------------------------------------------------------
/// One line of a record's status history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: PaymentStatus,
    pub timestamp: DateTime<Utc>,
    pub source: StatusSource,
}

//--------------------------------------     Instructions      -------------------------------------------------------
/// Human-readable payment instructions for manual (direct wallet) invoices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instructions {
    pub en: String,
    pub ar: String,
}

impl Instructions {
    pub fn for_payment(amount: Money, currency: CryptoCurrency) -> Self {
        Self {
            en: format!("Send {amount} {currency} to the following address"),
            ar: format!("قم بإرسال {amount} {currency} إلى العنوان التالي"),
        }
    }
}

//--------------------------------------    PaymentRecord      -------------------------------------------------------
/// The single source of truth for one issued invoice.
///
/// Mutated only through the status-reconciliation path: the state machine decides a transition,
/// and the store applies it under a version check. `expected_amount` never changes after
/// creation, and `transaction_id`, once set, is never cleared or reassigned — a payment is
/// credited to exactly one transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: RecordId,
    pub order_id: OrderId,
    /// The provider's invoice identifier; the routing key for status checks.
    pub invoice_id: String,
    pub provider: PaymentProvider,
    pub currency: CryptoCurrency,
    pub expected_amount: Money,
    pub address: String,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub amount_paid: Option<Money>,
    pub confirmations: Option<u32>,
    pub payment_url: Option<String>,
    pub description: Option<String>,
    pub instructions: Option<Instructions>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub status_history: Vec<StatusEntry>,
    /// Optimistic concurrency token. Bumped on every applied mutation.
    pub version: u64,
}

impl PaymentRecord {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|t| now > t).unwrap_or(false)
    }
}

//--------------------------------------   NewPaymentRecord    -------------------------------------------------------
/// Everything needed to persist a freshly issued invoice. The store initialises the lifecycle
/// fields (status `pending`, version 1, one history entry).
#[derive(Debug, Clone)]
pub struct NewPaymentRecord {
    pub id: RecordId,
    pub order_id: OrderId,
    pub invoice_id: String,
    pub provider: PaymentProvider,
    pub currency: CryptoCurrency,
    pub expected_amount: Money,
    pub address: String,
    pub payment_url: Option<String>,
    pub description: Option<String>,
    pub instructions: Option<Instructions>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

//--------------------------------------   StatusTransition    -------------------------------------------------------
/// An applied change of record state, produced by the state machine and consumed by the store.
#[derive(Debug, Clone)]
pub struct StatusTransition {
    pub new_status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub amount_paid: Option<Money>,
    pub confirmations: Option<u32>,
    pub source: StatusSource,
    pub timestamp: DateTime<Utc>,
}

impl StatusTransition {
    pub fn new(new_status: PaymentStatus, source: StatusSource) -> Self {
        Self { new_status, transaction_id: None, amount_paid: None, confirmations: None, source, timestamp: Utc::now() }
    }

    pub fn with_transaction_id<S: Into<String>>(mut self, txid: S) -> Self {
        self.transaction_id = Some(txid.into());
        self
    }

    pub fn with_amount_paid(mut self, amount: Money) -> Self {
        self.amount_paid = Some(amount);
        self
    }

    pub fn with_confirmations(mut self, confirmations: u32) -> Self {
        self.confirmations = Some(confirmations);
        self
    }
}

//--------------------------------------  ObservationRefresh   -------------------------------------------------------
/// A no-transition update: the upstream state is unchanged, so only the volatile fields and the
/// `updated_at` stamp move. No history entry is appended.
#[derive(Debug, Clone)]
pub struct ObservationRefresh {
    pub amount_paid: Option<Money>,
    pub confirmations: Option<u32>,
    pub timestamp: DateTime<Utc>,
}

//--------------------------------------    InvoiceRequest     -------------------------------------------------------
/// The invoice-creation boundary input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub order_id: OrderId,
    pub amount: Money,
    pub currency: CryptoCurrency,
    pub description: Option<String>,
}

impl InvoiceRequest {
    pub fn new<O: Into<OrderId>>(order_id: O, amount: Money, currency: CryptoCurrency) -> Self {
        Self { order_id: order_id.into(), amount, currency, description: None }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The description sent upstream when the caller supplied none.
    pub fn description_or_default(&self) -> String {
        self.description.clone().unwrap_or_else(|| format!("Subscription payment - {}", self.order_id.as_str()))
    }
}

//--------------------------------------    InvoiceReceipt     -------------------------------------------------------
/// The invoice-creation boundary output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceReceipt {
    pub invoice_id: String,
    pub provider: PaymentProvider,
    pub address: String,
    pub amount: Money,
    pub currency: CryptoCurrency,
    pub status: PaymentStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub payment_url: Option<String>,
    pub instructions: Option<Instructions>,
}

impl InvoiceReceipt {
    pub fn from_record(record: &PaymentRecord) -> Self {
        Self {
            invoice_id: record.invoice_id.clone(),
            provider: record.provider,
            address: record.address.clone(),
            amount: record.expected_amount,
            currency: record.currency,
            status: record.status,
            expires_at: record.expires_at,
            payment_url: record.payment_url.clone(),
            instructions: record.instructions.clone(),
        }
    }
}

//--------------------------------------     StatusReport      -------------------------------------------------------
/// The status boundary output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: PaymentStatus,
    pub amount_paid: Option<Money>,
    pub amount_expected: Money,
    pub currency: CryptoCurrency,
    pub transaction_id: Option<String>,
    pub confirmations: Option<u32>,
    pub provider: PaymentProvider,
}

impl StatusReport {
    pub fn from_record(record: &PaymentRecord) -> Self {
        Self {
            status: record.status,
            amount_paid: record.amount_paid,
            amount_expected: record.expected_amount,
            currency: record.currency,
            transaction_id: record.transaction_id.clone(),
            confirmations: record.confirmations,
            provider: record.provider,
        }
    }
}
