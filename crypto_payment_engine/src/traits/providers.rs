use async_trait::async_trait;
use block_explorers::{ChainVerifiers, ExplorerApiError, VerifyOutcome};
use chrono::{DateTime, Utc};
use cpg_common::{CryptoCurrency, Money, PaymentProvider, PaymentStatus};
use invoice_providers::ProviderApiError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record_types::{Instructions, InvoiceRequest, PaymentRecord, StatusSource};

//--------------------------------------     ProviderError     -------------------------------------------------------
/// Typed failures at the provider seam. Nothing upstream is allowed to cross the orchestration
/// boundary as an unhandled fault: a hiccup on one invoice must not take down the reconciliation
/// of unrelated ones.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The upstream API was unreachable or timed out. Retry later; never mutate state on this.
    #[error("Upstream temporarily unavailable: {0}")]
    Transient(String),
    /// The upstream answered with something we do not understand. Surfaced for manual review.
    #[error("Provider protocol error: {0}")]
    Protocol(String),
    /// The upstream understood us and said no.
    #[error("Provider rejected the request: {0}")]
    Rejected(String),
    /// No wallet or payment route is configured for the requested currency.
    #[error("No payment route configured for {0}")]
    UnsupportedCurrency(CryptoCurrency),
}

impl From<ProviderApiError> for ProviderError {
    fn from(e: ProviderApiError) -> Self {
        match e {
            ProviderApiError::RequestFailed(m) => ProviderError::Transient(m),
            ProviderApiError::QueryError { status, message } if status >= 500 => {
                ProviderError::Transient(format!("upstream error {status}: {message}"))
            },
            ProviderApiError::QueryError { status, message } => {
                ProviderError::Rejected(format!("upstream error {status}: {message}"))
            },
            ProviderApiError::Initialization(m) |
            ProviderApiError::JsonError(m) |
            ProviderApiError::InvalidAmount(m) => ProviderError::Protocol(m),
            ProviderApiError::MissingField(f) => ProviderError::Protocol(format!("missing field {f}")),
        }
    }
}

impl From<ExplorerApiError> for ProviderError {
    fn from(e: ExplorerApiError) -> Self {
        match e {
            ExplorerApiError::RequestFailed(m) => ProviderError::Transient(m),
            ExplorerApiError::UpstreamStatus { status, message } => {
                ProviderError::Transient(format!("explorer error {status}: {message}"))
            },
            // Rate limits and similar rejections clear on their own; retrying is the right move.
            ExplorerApiError::UpstreamRejected(m) => ProviderError::Transient(m),
            ExplorerApiError::Initialization(m) |
            ExplorerApiError::JsonError(m) |
            ExplorerApiError::InvalidAmount(m) => ProviderError::Protocol(m),
        }
    }
}

//--------------------------------------   StatusObservation   -------------------------------------------------------
/// One provider's (or chain scan's) answer to "what is this invoice's status now?", already
/// translated to the canonical vocabulary.
#[derive(Debug, Clone)]
pub struct StatusObservation {
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub amount_paid: Option<Money>,
    pub confirmations: Option<u32>,
    pub source: StatusSource,
}

//--------------------------------------     IssuedInvoice     -------------------------------------------------------
/// What an adapter hands back after successfully creating an invoice.
#[derive(Debug, Clone)]
pub struct IssuedInvoice {
    pub provider: PaymentProvider,
    pub invoice_id: String,
    pub address: String,
    /// The amount the payer must send, in `currency`. Hosted providers may convert the requested
    /// (USD-priced) amount; the manual route passes it through unchanged.
    pub amount: Money,
    pub currency: CryptoCurrency,
    pub expires_at: Option<DateTime<Utc>>,
    pub payment_url: Option<String>,
    pub instructions: Option<Instructions>,
}

//--------------------------------------     CurrencyInfo      -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyInfo {
    pub currency: String,
    pub name: String,
    pub network: String,
    pub min_amount: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeEstimate {
    pub estimated_amount: Money,
    pub currency: CryptoCurrency,
    pub network_fee: Money,
    pub service_fee: Money,
}

//--------------------------------------    ProviderAdapter    -------------------------------------------------------
/// One payment route: a hosted invoicing service, or the manual on-chain wallet path.
///
/// Adapters are tried as an ordered list at creation time and routed to by provider name at
/// status-check time. Every failure is a typed [`ProviderError`]; control flow by exception is
/// exactly what this seam exists to remove.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<IssuedInvoice, ProviderError>;

    async fn check_invoice(&self, record: &PaymentRecord) -> Result<StatusObservation, ProviderError>;

    /// Currencies this route can accept, if it can enumerate them. `None` defers to the next
    /// adapter in preference order.
    async fn supported_currencies(&self) -> Result<Option<Vec<CurrencyInfo>>, ProviderError> {
        Ok(None)
    }

    /// Network fee estimate for a payment, if this route can produce one.
    async fn estimate_fee(&self, _currency: CryptoCurrency, _amount: Money) -> Result<Option<FeeEstimate>, ProviderError> {
        Ok(None)
    }
}

//--------------------------------------     ChainVerifier     -------------------------------------------------------
/// Read-only on-chain verification, dispatched by currency.
#[async_trait]
pub trait ChainVerifier: Send + Sync {
    async fn verify(
        &self,
        currency: CryptoCurrency,
        address: &str,
        min_amount: Money,
    ) -> Result<VerifyOutcome, ProviderError>;
}

#[async_trait]
impl ChainVerifier for ChainVerifiers {
    async fn verify(
        &self,
        currency: CryptoCurrency,
        address: &str,
        min_amount: Money,
    ) -> Result<VerifyOutcome, ProviderError> {
        self.verify_for(currency, address, min_amount).await.map_err(ProviderError::from)
    }
}
