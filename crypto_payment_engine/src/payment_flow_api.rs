use std::sync::Arc;

use chrono::Utc;
use cpg_common::{CryptoCurrency, Money, PaymentProvider, PaymentStatus};
use log::*;
use thiserror::Error;

use crate::{
    events::{AuditAction, AuditEvent, EventEmitters, PaymentCompletedEvent},
    helpers,
    record_types::{
        InvoiceReceipt,
        InvoiceRequest,
        NewPaymentRecord,
        OrderId,
        PaymentRecord,
        StatusReport,
        StatusSource,
        StatusTransition,
    },
    state::{evaluate, Decision},
    traits::{
        CurrencyInfo,
        FeeEstimate,
        PaymentStore,
        PaymentStoreError,
        ProviderAdapter,
        ProviderError,
        StatusObservation,
    },
};

const SYSTEM_ACTOR: &str = "system";
const SWEEP_ACTOR: &str = "system/expiry-sweep";

//--------------------------------------   PaymentFlowError    -------------------------------------------------------
#[derive(Debug, Error)]
pub enum PaymentFlowError {
    /// The upstream was unreachable or timed out. Nothing was mutated; retry later.
    #[error("Payment provider temporarily unavailable: {0}")]
    TransientUpstream(String),
    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(CryptoCurrency),
    #[error("Provider protocol error: {0}")]
    ProviderProtocol(String),
    /// A forbidden transition or attribution change was attempted. Rejected and logged; this
    /// points at a bug or an attack, never at normal operation.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    #[error("A payment record already exists for order {0}")]
    OrderAlreadyExists(OrderId),
    #[error("No payment record found for invoice {0}")]
    RecordNotFound(String),
    #[error("No adapter is configured for provider {0}")]
    ProviderNotConfigured(PaymentProvider),
    #[error("Every configured provider failed to issue the invoice. Last error: {0}")]
    AllProvidersFailed(String),
    #[error(transparent)]
    StoreError(#[from] PaymentStoreError),
}

//--------------------------------------    PaymentFlowApi     -------------------------------------------------------
/// The orchestrator: issues invoices against an ordered list of payment routes, answers status
/// checks by reconciling upstream observations onto the record state machine, and applies the
/// administrative actions. Every applied transition and every admin action emits an audit event.
pub struct PaymentFlowApi<B> {
    store: B,
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    emitters: EventEmitters,
}

impl<B> std::fmt::Debug for PaymentFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentFlowApi({} adapters)", self.adapters.len())
    }
}

impl<B> PaymentFlowApi<B>
where B: PaymentStore
{
    /// `adapters` is the creation-time preference order: the commercial hosted provider first if
    /// credentialled, the self-hosted one next, the manual wallet route last. The order is fixed
    /// per deployment and never depends on load or error history within a request.
    pub fn new(store: B, adapters: Vec<Arc<dyn ProviderAdapter>>, emitters: EventEmitters) -> Self {
        Self { store, adapters, emitters }
    }

    /// Issue an invoice for an order.
    ///
    /// If the order already has a live invoice, that invoice is returned unchanged — re-invoicing
    /// never silently duplicates. An order whose previous invoice reached a terminal state must
    /// be explicitly superseded through [`Self::reissue_invoice`].
    pub async fn issue_invoice(&self, request: InvoiceRequest) -> Result<InvoiceReceipt, PaymentFlowError> {
        if let Some(existing) = self.store.fetch_by_order_id(&request.order_id).await? {
            if !existing.is_terminal() {
                debug!(
                    "🧾️ Order {} already has live invoice {}; reusing it",
                    request.order_id, existing.invoice_id
                );
                return Ok(InvoiceReceipt::from_record(&existing));
            }
            return Err(PaymentFlowError::OrderAlreadyExists(request.order_id));
        }
        self.create_and_record(&request, AuditAction::Issue, SYSTEM_ACTOR).await
    }

    /// Explicitly supersede an order's invoice: the live record (if any) is cancelled and a fresh
    /// invoice is issued. The superseded record is retained for audit.
    pub async fn reissue_invoice(&self, actor: &str, request: InvoiceRequest) -> Result<InvoiceReceipt, PaymentFlowError> {
        if let Some(existing) = self.store.fetch_by_order_id(&request.order_id).await? {
            if !existing.is_terminal() {
                let old_status = existing.status;
                let cancel =
                    StatusTransition::new(PaymentStatus::Cancelled, StatusSource::Admin(actor.to_string()));
                let cancelled = self.store.apply_transition(&existing.invoice_id, existing.version, cancel).await?;
                info!("🧾️ Invoice {} superseded for order {}", cancelled.invoice_id, request.order_id);
                self.audit(
                    AuditEvent::for_record(&cancelled, actor, AuditAction::Reissue)
                        .with_old_status(old_status)
                        .with_note("superseded by re-issue"),
                )
                .await;
            }
        }
        self.create_and_record(&request, AuditAction::Issue, actor).await
    }

    async fn create_and_record(
        &self,
        request: &InvoiceRequest,
        action: AuditAction,
        actor: &str,
    ) -> Result<InvoiceReceipt, PaymentFlowError> {
        let mut last_error: Option<ProviderError> = None;
        for adapter in &self.adapters {
            let provider = adapter.provider();
            match adapter.create_invoice(request).await {
                Ok(issued) => {
                    let record = self
                        .store
                        .insert(NewPaymentRecord {
                            id: helpers::new_record_id(),
                            order_id: request.order_id.clone(),
                            invoice_id: issued.invoice_id.clone(),
                            provider: issued.provider,
                            currency: issued.currency,
                            expected_amount: issued.amount,
                            address: issued.address.clone(),
                            payment_url: issued.payment_url.clone(),
                            description: request.description.clone(),
                            instructions: issued.instructions.clone(),
                            created_at: Utc::now(),
                            expires_at: issued.expires_at,
                        })
                        .await?;
                    info!("🧾️ Invoice {} issued via {provider} for order {}", record.invoice_id, request.order_id);
                    self.audit(AuditEvent::for_record(&record, actor, action)).await;
                    return Ok(InvoiceReceipt::from_record(&record));
                },
                Err(e) => {
                    warn!("🧾️ {provider} could not issue an invoice for order {}: {e}", request.order_id);
                    last_error = Some(e);
                },
            }
        }
        match last_error {
            Some(ProviderError::UnsupportedCurrency(c)) => Err(PaymentFlowError::UnsupportedCurrency(c)),
            Some(e) => Err(PaymentFlowError::AllProvidersFailed(e.to_string())),
            None => Err(PaymentFlowError::AllProvidersFailed("no payment providers are configured".to_string())),
        }
    }

    /// Answer "what is this invoice's status now?".
    ///
    /// Routes to the adapter that issued the invoice, evaluates its observation against the
    /// record's state machine, applies any resulting transition under the store's version check,
    /// and reports the (possibly unchanged) stored state. Transient upstream failures surface as
    /// [`PaymentFlowError::TransientUpstream`] without touching the record — under-confirming is
    /// safe, over-confirming is a financial error.
    pub async fn check_status(&self, invoice_id: &str) -> Result<StatusReport, PaymentFlowError> {
        let record = self.fetch_record(invoice_id).await?;
        if record.is_terminal() {
            trace!("💰️ Invoice {invoice_id} is already '{}'; skipping the upstream check", record.status);
            return Ok(StatusReport::from_record(&record));
        }
        let adapter = self.adapter_for(record.provider)?;
        let observation = match adapter.check_invoice(&record).await {
            Ok(observation) => observation,
            Err(ProviderError::Transient(m)) => {
                debug!("💰️ Upstream unavailable while checking invoice {invoice_id}: {m}");
                return Err(PaymentFlowError::TransientUpstream(m));
            },
            Err(ProviderError::UnsupportedCurrency(c)) => return Err(PaymentFlowError::UnsupportedCurrency(c)),
            Err(ProviderError::Protocol(m) | ProviderError::Rejected(m)) => {
                // We refuse to guess at a lifecycle state: the record parks in `unknown` until a
                // human looks at it.
                warn!("💰️ Unintelligible provider reply for invoice {invoice_id}: {m}");
                StatusObservation {
                    status: PaymentStatus::Unknown,
                    transaction_id: None,
                    amount_paid: None,
                    confirmations: None,
                    source: StatusSource::Provider(record.provider),
                }
            },
        };
        self.reconcile(record, observation).await
    }

    async fn reconcile(
        &self,
        record: PaymentRecord,
        observation: StatusObservation,
    ) -> Result<StatusReport, PaymentFlowError> {
        match evaluate(&record, &observation) {
            Decision::Apply(transition) => {
                let old_status = record.status;
                match self.store.apply_transition(&record.invoice_id, record.version, transition).await {
                    Ok(updated) => {
                        info!("💰️ Invoice {} moved '{old_status}' -> '{}'", updated.invoice_id, updated.status);
                        self.audit(
                            AuditEvent::for_record(&updated, SYSTEM_ACTOR, AuditAction::StatusChange)
                                .with_old_status(old_status),
                        )
                        .await;
                        if updated.status == PaymentStatus::Completed {
                            self.emit_completed(&updated).await;
                        }
                        Ok(StatusReport::from_record(&updated))
                    },
                    Err(PaymentStoreError::VersionConflict { .. }) => {
                        debug!(
                            "💰️ Lost the reconciliation race for invoice {}; reporting the stored state",
                            record.invoice_id
                        );
                        let fresh = self.fetch_record(&record.invoice_id).await?;
                        Ok(StatusReport::from_record(&fresh))
                    },
                    Err(PaymentStoreError::TransactionIdReassignment { existing, attempted, .. }) => {
                        let message = format!(
                            "invoice {} is credited to transaction {existing}; observation from {} named {attempted}",
                            record.invoice_id, observation.source
                        );
                        error!("🚨️ {message}");
                        self.audit(
                            AuditEvent::for_record(&record, SYSTEM_ACTOR, AuditAction::AnomalyDetected)
                                .with_note(message),
                        )
                        .await;
                        Ok(StatusReport::from_record(&record))
                    },
                    Err(e) => Err(e.into()),
                }
            },
            Decision::Refresh(refresh) => {
                match self.store.refresh_observation(&record.invoice_id, record.version, refresh).await {
                    Ok(updated) => Ok(StatusReport::from_record(&updated)),
                    Err(PaymentStoreError::VersionConflict { .. }) => {
                        let fresh = self.fetch_record(&record.invoice_id).await?;
                        Ok(StatusReport::from_record(&fresh))
                    },
                    Err(e) => Err(e.into()),
                }
            },
            Decision::Ignore(reason) => {
                trace!("💰️ Nothing to apply for invoice {}: {reason}", record.invoice_id);
                Ok(StatusReport::from_record(&record))
            },
            Decision::Anomaly(message) => {
                error!("🚨️ {message}");
                self.audit(
                    AuditEvent::for_record(&record, SYSTEM_ACTOR, AuditAction::AnomalyDetected).with_note(message),
                )
                .await;
                Ok(StatusReport::from_record(&record))
            },
        }
    }

    /// Administrative override: move any non-terminal invoice straight to `completed`, recording
    /// the actor and a synthetic transaction reference when none is supplied. This is the only
    /// path allowed to skip ordinary verification, and it is always audited.
    pub async fn force_confirm(
        &self,
        invoice_id: &str,
        actor: &str,
        transaction_id: Option<String>,
    ) -> Result<PaymentRecord, PaymentFlowError> {
        let record = self.fetch_record(invoice_id).await?;
        if record.is_terminal() {
            let message =
                format!("cannot force-confirm invoice {invoice_id} out of terminal state '{}'", record.status);
            error!("🚨️ {message}");
            self.audit(AuditEvent::for_record(&record, actor, AuditAction::AnomalyDetected).with_note(message.clone()))
                .await;
            return Err(PaymentFlowError::InvariantViolation(message));
        }
        let old_status = record.status;
        let source = StatusSource::Admin(actor.to_string());
        let transition = match (&record.transaction_id, transaction_id) {
            // Already credited: the override completes against the recorded transaction.
            (Some(_), None) => StatusTransition::new(PaymentStatus::Completed, source),
            (_, Some(txid)) => StatusTransition::new(PaymentStatus::Completed, source).with_transaction_id(txid),
            (None, None) => StatusTransition::new(PaymentStatus::Completed, source)
                .with_transaction_id(helpers::admin_override_txid(Utc::now())),
        };
        let updated = self.store.apply_transition(invoice_id, record.version, transition).await.map_err(|e| match e {
            PaymentStoreError::VersionConflict { .. } => PaymentFlowError::InvariantViolation(format!(
                "invoice {invoice_id} changed while the force-confirm was in flight; re-inspect and retry"
            )),
            PaymentStoreError::TransactionIdReassignment { existing, .. } => PaymentFlowError::InvariantViolation(
                format!("invoice {invoice_id} is already credited to transaction {existing}"),
            ),
            other => PaymentFlowError::from(other),
        })?;
        info!("💰️ Invoice {invoice_id} force-confirmed by {actor}");
        self.audit(
            AuditEvent::for_record(&updated, actor, AuditAction::ForceConfirm)
                .with_old_status(old_status)
                .with_note("administrative override; ordinary verification skipped"),
        )
        .await;
        self.emit_completed(&updated).await;
        Ok(updated)
    }

    /// Administrative cancellation of any non-terminal invoice.
    pub async fn cancel_invoice(
        &self,
        invoice_id: &str,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<PaymentRecord, PaymentFlowError> {
        let record = self.fetch_record(invoice_id).await?;
        if record.is_terminal() {
            let message = format!("cannot cancel invoice {invoice_id} out of terminal state '{}'", record.status);
            error!("🚨️ {message}");
            self.audit(AuditEvent::for_record(&record, actor, AuditAction::AnomalyDetected).with_note(message.clone()))
                .await;
            return Err(PaymentFlowError::InvariantViolation(message));
        }
        let old_status = record.status;
        let transition = StatusTransition::new(PaymentStatus::Cancelled, StatusSource::Admin(actor.to_string()));
        let updated = self.store.apply_transition(invoice_id, record.version, transition).await.map_err(|e| match e {
            PaymentStoreError::VersionConflict { .. } => PaymentFlowError::InvariantViolation(format!(
                "invoice {invoice_id} changed while the cancellation was in flight; re-inspect and retry"
            )),
            other => PaymentFlowError::from(other),
        })?;
        info!("💰️ Invoice {invoice_id} cancelled by {actor}");
        self.audit(
            AuditEvent::for_record(&updated, actor, AuditAction::Cancel)
                .with_old_status(old_status)
                .with_note(reason.unwrap_or("cancelled by admin")),
        )
        .await;
        Ok(updated)
    }

    /// Retire invoices that are past their expiry and still unpaid. The scheduling cadence is the
    /// embedder's concern; the call itself is safe to run concurrently with reconciliation — a
    /// record that moves under the sweep is simply left alone.
    pub async fn expire_overdue_invoices(&self) -> Result<Vec<PaymentRecord>, PaymentFlowError> {
        let now = Utc::now();
        let candidates = self.store.fetch_expired_candidates(now).await?;
        let mut expired = Vec::with_capacity(candidates.len());
        for record in candidates {
            let transition = StatusTransition::new(PaymentStatus::Expired, StatusSource::Admin(SWEEP_ACTOR.to_string()));
            match self.store.apply_transition(&record.invoice_id, record.version, transition).await {
                Ok(updated) => {
                    info!("🧾️ Invoice {} expired unpaid", updated.invoice_id);
                    self.audit(
                        AuditEvent::for_record(&updated, SWEEP_ACTOR, AuditAction::Expire)
                            .with_old_status(record.status),
                    )
                    .await;
                    expired.push(updated);
                },
                Err(PaymentStoreError::VersionConflict { .. }) => {
                    debug!("🧾️ Invoice {} moved while expiring; leaving it to reconciliation", record.invoice_id);
                },
                Err(e) => return Err(e.into()),
            }
        }
        Ok(expired)
    }

    /// The currencies payable right now, answered by the first route that can enumerate them.
    pub async fn supported_currencies(&self) -> Result<Vec<CurrencyInfo>, PaymentFlowError> {
        for adapter in &self.adapters {
            match adapter.supported_currencies().await {
                Ok(Some(list)) => return Ok(list),
                Ok(None) => continue,
                Err(e) => {
                    warn!("🧾️ {} could not enumerate currencies: {e}", adapter.provider());
                    continue;
                },
            }
        }
        Ok(Vec::new())
    }

    /// Estimate network fees for a payment, answered by the first route that can.
    pub async fn estimate_network_fee(
        &self,
        currency: CryptoCurrency,
        amount: Money,
    ) -> Result<FeeEstimate, PaymentFlowError> {
        for adapter in &self.adapters {
            match adapter.estimate_fee(currency, amount).await {
                Ok(Some(estimate)) => return Ok(estimate),
                Ok(None) => continue,
                Err(e) => {
                    warn!("🧾️ {} could not estimate fees: {e}", adapter.provider());
                    continue;
                },
            }
        }
        Ok(FeeEstimate { estimated_amount: amount, currency, network_fee: Money::ZERO, service_fee: Money::ZERO })
    }

    /// The stored record, without consulting any upstream.
    pub async fn payment_record(&self, invoice_id: &str) -> Result<PaymentRecord, PaymentFlowError> {
        self.fetch_record(invoice_id).await
    }

    async fn fetch_record(&self, invoice_id: &str) -> Result<PaymentRecord, PaymentFlowError> {
        self.store
            .fetch_by_invoice_id(invoice_id)
            .await?
            .ok_or_else(|| PaymentFlowError::RecordNotFound(invoice_id.to_string()))
    }

    fn adapter_for(&self, provider: PaymentProvider) -> Result<&Arc<dyn ProviderAdapter>, PaymentFlowError> {
        self.adapters
            .iter()
            .find(|a| a.provider() == provider)
            .ok_or(PaymentFlowError::ProviderNotConfigured(provider))
    }

    async fn audit(&self, event: AuditEvent) {
        for emitter in &self.emitters.audit {
            emitter.publish(event.clone()).await;
        }
    }

    async fn emit_completed(&self, record: &PaymentRecord) {
        for emitter in &self.emitters.payment_completed {
            emitter.publish(PaymentCompletedEvent::new(record.clone())).await;
        }
    }

    pub fn store(&self) -> &B {
        &self.store
    }
}
