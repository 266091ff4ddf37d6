//! End-to-end orchestration tests: invoice issuance with provider fallback, status
//! reconciliation, admin actions, and the audit trail — against scripted providers and
//! verifiers.

use std::{
    collections::{HashMap, VecDeque},
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use block_explorers::{ChainTransaction, VerifyOutcome};
use chrono::Duration;
use cpg_common::{CryptoCurrency, Money, PaymentProvider, PaymentStatus};
use crypto_payment_engine::{
    adapters::{ManualAdapter, WalletConfig},
    events::{AuditAction, AuditEvent, EventHandlers, EventHooks},
    ChainVerifier,
    InvoiceRequest,
    IssuedInvoice,
    MemoryStore,
    PaymentFlowApi,
    PaymentFlowError,
    ProviderAdapter,
    ProviderError,
    StatusObservation,
    StatusSource,
};
use rust_decimal_macros::dec;

const TRON_WALLET: &str = "TJkLFH53mJUzaTMxLtYqa28jzL9CppJotV";
const BTC_WALLET: &str = "14MxL4x95TRTYJroWe8bWy4wSLq6c4WCr5";

//--------------------------------------  scripted test doubles  -----------------------------------------------------

struct MockProvider {
    provider: PaymentProvider,
    creations: Mutex<VecDeque<Result<IssuedInvoice, ProviderError>>>,
    observations: Mutex<VecDeque<Result<StatusObservation, ProviderError>>>,
    creation_calls: Mutex<u32>,
}

impl MockProvider {
    fn new(provider: PaymentProvider) -> Self {
        Self {
            provider,
            creations: Mutex::new(VecDeque::new()),
            observations: Mutex::new(VecDeque::new()),
            creation_calls: Mutex::new(0),
        }
    }

    fn script_creation(&self, result: Result<IssuedInvoice, ProviderError>) {
        self.creations.lock().unwrap().push_back(result);
    }

    fn script_observation(&self, result: Result<StatusObservation, ProviderError>) {
        self.observations.lock().unwrap().push_back(result);
    }

    fn creation_calls(&self) -> u32 {
        *self.creation_calls.lock().unwrap()
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    fn provider(&self) -> PaymentProvider {
        self.provider
    }

    async fn create_invoice(&self, _request: &InvoiceRequest) -> Result<IssuedInvoice, ProviderError> {
        *self.creation_calls.lock().unwrap() += 1;
        self.creations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Transient("creation script exhausted".to_string())))
    }

    async fn check_invoice(&self, _record: &crypto_payment_engine::PaymentRecord) -> Result<StatusObservation, ProviderError> {
        self.observations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Transient("observation script exhausted".to_string())))
    }
}

struct ScriptedVerifier {
    outcomes: Mutex<VecDeque<VerifyOutcome>>,
    delay: std::time::Duration,
}

impl ScriptedVerifier {
    fn new(outcomes: Vec<VerifyOutcome>) -> Self {
        Self { outcomes: Mutex::new(outcomes.into()), delay: std::time::Duration::ZERO }
    }

    fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ChainVerifier for ScriptedVerifier {
    async fn verify(
        &self,
        _currency: CryptoCurrency,
        _address: &str,
        _min_amount: Money,
    ) -> Result<VerifyOutcome, ProviderError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.outcomes.lock().unwrap().pop_front().unwrap_or(VerifyOutcome::NotFound))
    }
}

//--------------------------------------       helpers        --------------------------------------------------------

fn issued(provider: PaymentProvider, invoice_id: &str, amount: Money, currency: CryptoCurrency) -> IssuedInvoice {
    IssuedInvoice {
        provider,
        invoice_id: invoice_id.to_string(),
        address: format!("addr-{provider}"),
        amount,
        currency,
        expires_at: None,
        payment_url: None,
        instructions: None,
    }
}

fn observation(provider: PaymentProvider, status: PaymentStatus, txid: Option<&str>) -> StatusObservation {
    StatusObservation {
        status,
        transaction_id: txid.map(String::from),
        amount_paid: None,
        confirmations: None,
        source: StatusSource::Provider(provider),
    }
}

fn qualified(txid: &str, amount: Money) -> VerifyOutcome {
    VerifyOutcome::Qualified(ChainTransaction {
        txid: txid.to_string(),
        to_address: TRON_WALLET.to_string(),
        amount,
        confirmed: true,
        confirmations: Some(1),
        block_height: Some(63_000_000),
    })
}

fn short(txid: &str, amount: Money) -> VerifyOutcome {
    VerifyOutcome::Short(ChainTransaction {
        txid: txid.to_string(),
        to_address: BTC_WALLET.to_string(),
        amount,
        confirmed: true,
        confirmations: Some(2),
        block_height: Some(840_000),
    })
}

fn tron_wallets() -> WalletConfig {
    WalletConfig::new(HashMap::from([(CryptoCurrency::UsdtTrc20, TRON_WALLET.to_string())]))
}

fn btc_wallets() -> WalletConfig {
    WalletConfig::new(HashMap::from([(CryptoCurrency::Btc, BTC_WALLET.to_string())]))
}

fn audit_collector() -> (EventHooks, Arc<Mutex<Vec<AuditEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let mut hooks = EventHooks::default();
    hooks.on_audit(move |event| {
        let sink = sink.clone();
        Box::pin(async move {
            sink.lock().unwrap().push(event);
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    (hooks, events)
}

fn api_with(adapters: Vec<Arc<dyn ProviderAdapter>>, hooks: EventHooks) -> PaymentFlowApi<MemoryStore> {
    let handlers = EventHandlers::new(32, hooks);
    let emitters = handlers.emitters();
    handlers.start_handlers();
    PaymentFlowApi::new(MemoryStore::new(), adapters, emitters)
}

async fn wait_for_audit(events: &Arc<Mutex<Vec<AuditEvent>>>, at_least: usize) {
    for _ in 0..200 {
        if events.lock().unwrap().len() >= at_least {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("expected at least {at_least} audit events, saw {}", events.lock().unwrap().len());
}

fn request_usdt(order: &str, amount: Money) -> InvoiceRequest {
    InvoiceRequest::new(order, amount, CryptoCurrency::UsdtTrc20)
}

//--------------------------------------        tests         --------------------------------------------------------

#[tokio::test]
async fn nowpayments_is_preferred_when_configured() {
    let _ = env_logger::try_init();
    let np = Arc::new(MockProvider::new(PaymentProvider::NowPayments));
    np.script_creation(Ok(issued(PaymentProvider::NowPayments, "np-1", Money::from(50), CryptoCurrency::UsdtTrc20)));
    let btcpay = Arc::new(MockProvider::new(PaymentProvider::BtcPay));
    let api = api_with(vec![np.clone(), btcpay.clone()], EventHooks::default());

    let receipt = api.issue_invoice(request_usdt("order-1", Money::from(50))).await.unwrap();
    assert_eq!(receipt.provider, PaymentProvider::NowPayments);
    assert_eq!(receipt.invoice_id, "np-1");
    assert_eq!(receipt.status, PaymentStatus::Pending);
    assert_eq!(np.creation_calls(), 1);
    assert_eq!(btcpay.creation_calls(), 0, "the fallback must not be consulted when the preferred provider succeeds");
}

#[tokio::test]
async fn creation_falls_back_in_fixed_order() {
    let np = Arc::new(MockProvider::new(PaymentProvider::NowPayments));
    np.script_creation(Err(ProviderError::Transient("NowPayments is down".to_string())));
    let btcpay = Arc::new(MockProvider::new(PaymentProvider::BtcPay));
    btcpay.script_creation(Err(ProviderError::Transient("BTCPay is down too".to_string())));
    let manual = Arc::new(ManualAdapter::new(tron_wallets(), Arc::new(ScriptedVerifier::new(vec![]))));
    let api = api_with(vec![np.clone(), btcpay.clone(), manual], EventHooks::default());

    let receipt = api.issue_invoice(request_usdt("order-2", Money::from(50))).await.unwrap();
    assert_eq!(receipt.provider, PaymentProvider::Manual);
    assert!(receipt.invoice_id.starts_with("manual_"));
    assert_eq!(receipt.address, TRON_WALLET);
    assert_eq!(np.creation_calls(), 1);
    assert_eq!(btcpay.creation_calls(), 1);
}

#[tokio::test]
async fn all_hosted_providers_down_and_no_wallets_fails_creation() {
    let np = Arc::new(MockProvider::new(PaymentProvider::NowPayments));
    np.script_creation(Err(ProviderError::Transient("down".to_string())));
    let api = api_with(vec![np], EventHooks::default());

    let err = api.issue_invoice(request_usdt("order-3", Money::from(50))).await.unwrap_err();
    assert!(matches!(err, PaymentFlowError::AllProvidersFailed(_)));
}

#[tokio::test]
async fn unsupported_currency_surfaces_immediately() {
    let manual = Arc::new(ManualAdapter::new(WalletConfig::default(), Arc::new(ScriptedVerifier::new(vec![]))));
    let api = api_with(vec![manual], EventHooks::default());

    let err = api.issue_invoice(request_usdt("order-4", Money::from(50))).await.unwrap_err();
    assert!(matches!(err, PaymentFlowError::UnsupportedCurrency(CryptoCurrency::UsdtTrc20)));
}

#[tokio::test]
async fn manual_trc20_payment_completes_once_the_chain_confirms_it() {
    let (hooks, events) = audit_collector();
    let verifier = ScriptedVerifier::new(vec![
        VerifyOutcome::NotFound,
        qualified("tron-tx-50", Money::new(dec!(50))),
    ]);
    let manual = Arc::new(ManualAdapter::new(tron_wallets(), Arc::new(verifier)));
    let api = api_with(vec![manual], hooks);

    let receipt = api.issue_invoice(request_usdt("order-5", Money::new(dec!(50)))).await.unwrap();
    assert_eq!(receipt.provider, PaymentProvider::Manual);
    assert!(receipt.instructions.is_some());

    // First check: nothing on-chain yet. The record stays pending with no history churn.
    let report = api.check_status(&receipt.invoice_id).await.unwrap();
    assert_eq!(report.status, PaymentStatus::Pending);

    // Second check: a confirmed 50 USDT transfer has appeared.
    let report = api.check_status(&receipt.invoice_id).await.unwrap();
    assert_eq!(report.status, PaymentStatus::Completed);
    assert_eq!(report.transaction_id.as_deref(), Some("tron-tx-50"));
    assert_eq!(report.amount_paid, Some(Money::new(dec!(50))));

    let record = api.payment_record(&receipt.invoice_id).await.unwrap();
    assert_eq!(record.status_history.len(), 2, "pending at issue, completed at verification");
    assert_eq!(record.status_history[1].status, PaymentStatus::Completed);

    wait_for_audit(&events, 2).await;
    let events = events.lock().unwrap();
    assert_eq!(events[0].action, AuditAction::Issue);
    assert_eq!(events[1].action, AuditAction::StatusChange);
    assert_eq!(events[1].old_status, Some(PaymentStatus::Pending));
    assert_eq!(events[1].new_status, Some(PaymentStatus::Completed));
}

#[tokio::test]
async fn undersized_btc_payment_goes_partial_and_never_completes() {
    let verifier = ScriptedVerifier::new(vec![
        short("btc-small", Money::new(dec!(0.005))),
        short("btc-small", Money::new(dec!(0.005))),
    ]);
    let manual = Arc::new(ManualAdapter::new(btc_wallets(), Arc::new(verifier)));
    let api = api_with(vec![manual], EventHooks::default());

    let request = InvoiceRequest::new("order-6", Money::new(dec!(0.01)), CryptoCurrency::Btc);
    let receipt = api.issue_invoice(request).await.unwrap();

    let report = api.check_status(&receipt.invoice_id).await.unwrap();
    assert_eq!(report.status, PaymentStatus::Partial);
    assert_eq!(report.amount_paid, Some(Money::new(dec!(0.005))));
    assert_eq!(report.transaction_id, None, "a partial payment must not credit the record to the short transfer");

    // The same shortfall observed again refreshes the record without a duplicate history entry.
    let report = api.check_status(&receipt.invoice_id).await.unwrap();
    assert_eq!(report.status, PaymentStatus::Partial);
    let record = api.payment_record(&receipt.invoice_id).await.unwrap();
    assert_eq!(record.status_history.len(), 2, "pending, partial — and nothing more");
}

#[tokio::test]
async fn hosted_status_checks_are_idempotent() {
    let np = Arc::new(MockProvider::new(PaymentProvider::NowPayments));
    np.script_creation(Ok(issued(PaymentProvider::NowPayments, "np-7", Money::from(50), CryptoCurrency::UsdtTrc20)));
    np.script_observation(Ok(observation(PaymentProvider::NowPayments, PaymentStatus::Confirming, Some("tx-7"))));
    np.script_observation(Ok(observation(PaymentProvider::NowPayments, PaymentStatus::Confirming, Some("tx-7"))));
    let api = api_with(vec![np], EventHooks::default());

    let receipt = api.issue_invoice(request_usdt("order-7", Money::from(50))).await.unwrap();
    let first = api.check_status(&receipt.invoice_id).await.unwrap();
    assert_eq!(first.status, PaymentStatus::Confirming);
    let second = api.check_status(&receipt.invoice_id).await.unwrap();
    assert_eq!(second.status, PaymentStatus::Confirming);

    let record = api.payment_record(&receipt.invoice_id).await.unwrap();
    assert_eq!(record.status_history.len(), 2, "an unchanged upstream state must not append history");
    assert_eq!(record.transaction_id.as_deref(), Some("tx-7"));
}

#[tokio::test]
async fn confirmation_without_a_transaction_id_is_rejected() {
    let (hooks, events) = audit_collector();
    let np = Arc::new(MockProvider::new(PaymentProvider::NowPayments));
    np.script_creation(Ok(issued(PaymentProvider::NowPayments, "np-8", Money::from(50), CryptoCurrency::UsdtTrc20)));
    np.script_observation(Ok(observation(PaymentProvider::NowPayments, PaymentStatus::Confirmed, None)));
    let api = api_with(vec![np], hooks);

    let receipt = api.issue_invoice(request_usdt("order-8", Money::from(50))).await.unwrap();
    let report = api.check_status(&receipt.invoice_id).await.unwrap();
    assert_eq!(report.status, PaymentStatus::Pending, "the record must stay in its prior state");

    wait_for_audit(&events, 2).await;
    let events = events.lock().unwrap();
    assert!(events.iter().any(|e| e.action == AuditAction::AnomalyDetected));
}

#[tokio::test]
async fn concurrent_checks_apply_exactly_one_completion() {
    let verifier = ScriptedVerifier::new(vec![
        qualified("tron-tx-9", Money::new(dec!(50))),
        qualified("tron-tx-9", Money::new(dec!(50))),
    ])
    .with_delay(std::time::Duration::from_millis(30));
    let manual = Arc::new(ManualAdapter::new(tron_wallets(), Arc::new(verifier)));
    let api = api_with(vec![manual], EventHooks::default());

    let receipt = api.issue_invoice(request_usdt("order-9", Money::new(dec!(50)))).await.unwrap();
    let (a, b) = tokio::join!(api.check_status(&receipt.invoice_id), api.check_status(&receipt.invoice_id));
    assert_eq!(a.unwrap().status, PaymentStatus::Completed);
    assert_eq!(b.unwrap().status, PaymentStatus::Completed);

    let record = api.payment_record(&receipt.invoice_id).await.unwrap();
    let completions =
        record.status_history.iter().filter(|entry| entry.status == PaymentStatus::Completed).count();
    assert_eq!(completions, 1, "both observers saw the same transaction; only one may record the transition");
}

#[tokio::test]
async fn terminal_states_are_never_left() {
    let np = Arc::new(MockProvider::new(PaymentProvider::NowPayments));
    np.script_creation(Ok(issued(PaymentProvider::NowPayments, "np-10", Money::from(50), CryptoCurrency::UsdtTrc20)));
    let api = api_with(vec![np], EventHooks::default());

    let receipt = api.issue_invoice(request_usdt("order-10", Money::from(50))).await.unwrap();
    let record = api.force_confirm(&receipt.invoice_id, "ops@example", None).await.unwrap();
    assert_eq!(record.status, PaymentStatus::Completed);
    assert!(record.transaction_id.unwrap().starts_with("admin_override_"));

    // A completed invoice answers from the store; no upstream call, no transition.
    let report = api.check_status(&receipt.invoice_id).await.unwrap();
    assert_eq!(report.status, PaymentStatus::Completed);

    let err = api.force_confirm(&receipt.invoice_id, "ops@example", None).await.unwrap_err();
    assert!(matches!(err, PaymentFlowError::InvariantViolation(_)));
    let err = api.cancel_invoice(&receipt.invoice_id, "ops@example", None).await.unwrap_err();
    assert!(matches!(err, PaymentFlowError::InvariantViolation(_)));
}

#[tokio::test]
async fn force_confirm_is_audited_with_its_actor() {
    let (hooks, events) = audit_collector();
    let np = Arc::new(MockProvider::new(PaymentProvider::NowPayments));
    np.script_creation(Ok(issued(PaymentProvider::NowPayments, "np-11", Money::from(50), CryptoCurrency::UsdtTrc20)));
    let api = api_with(vec![np], hooks);

    let receipt = api.issue_invoice(request_usdt("order-11", Money::from(50))).await.unwrap();
    api.force_confirm(&receipt.invoice_id, "ops@example", Some("manual-wire-442".to_string())).await.unwrap();

    wait_for_audit(&events, 2).await;
    let events = events.lock().unwrap();
    let forced = events.iter().find(|e| e.action == AuditAction::ForceConfirm).expect("force-confirm audit entry");
    assert_eq!(forced.actor, "ops@example");
    assert_eq!(forced.old_status, Some(PaymentStatus::Pending));
    assert_eq!(forced.new_status, Some(PaymentStatus::Completed));
}

#[tokio::test]
async fn reissuing_an_order_reuses_the_live_invoice() {
    let np = Arc::new(MockProvider::new(PaymentProvider::NowPayments));
    np.script_creation(Ok(issued(PaymentProvider::NowPayments, "np-12", Money::from(50), CryptoCurrency::UsdtTrc20)));
    let api = api_with(vec![np.clone()], EventHooks::default());

    let first = api.issue_invoice(request_usdt("order-12", Money::from(50))).await.unwrap();
    let second = api.issue_invoice(request_usdt("order-12", Money::from(50))).await.unwrap();
    assert_eq!(first.invoice_id, second.invoice_id);
    assert_eq!(np.creation_calls(), 1, "re-invoicing a live order must not touch the provider again");
}

#[tokio::test]
async fn explicit_reissue_supersedes_the_live_invoice() {
    let (hooks, events) = audit_collector();
    let np = Arc::new(MockProvider::new(PaymentProvider::NowPayments));
    np.script_creation(Ok(issued(PaymentProvider::NowPayments, "np-13a", Money::from(50), CryptoCurrency::UsdtTrc20)));
    np.script_creation(Ok(issued(PaymentProvider::NowPayments, "np-13b", Money::from(50), CryptoCurrency::UsdtTrc20)));
    let api = api_with(vec![np], hooks);

    let first = api.issue_invoice(request_usdt("order-13", Money::from(50))).await.unwrap();
    let second = api.reissue_invoice("ops@example", request_usdt("order-13", Money::from(50))).await.unwrap();
    assert_ne!(first.invoice_id, second.invoice_id);

    let old = api.payment_record(&first.invoice_id).await.unwrap();
    assert_eq!(old.status, PaymentStatus::Cancelled);

    wait_for_audit(&events, 3).await;
    let events = events.lock().unwrap();
    assert!(events.iter().any(|e| e.action == AuditAction::Reissue));
}

#[tokio::test]
async fn transient_upstream_errors_leave_the_record_untouched() {
    let np = Arc::new(MockProvider::new(PaymentProvider::NowPayments));
    np.script_creation(Ok(issued(PaymentProvider::NowPayments, "np-14", Money::from(50), CryptoCurrency::UsdtTrc20)));
    np.script_observation(Err(ProviderError::Transient("read timeout".to_string())));
    let api = api_with(vec![np], EventHooks::default());

    let receipt = api.issue_invoice(request_usdt("order-14", Money::from(50))).await.unwrap();
    let before = api.payment_record(&receipt.invoice_id).await.unwrap();
    let err = api.check_status(&receipt.invoice_id).await.unwrap_err();
    assert!(matches!(err, PaymentFlowError::TransientUpstream(_)));
    let after = api.payment_record(&receipt.invoice_id).await.unwrap();
    assert_eq!(after.version, before.version);
    assert_eq!(after.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn protocol_errors_park_the_record_in_unknown_until_it_recovers() {
    let np = Arc::new(MockProvider::new(PaymentProvider::NowPayments));
    np.script_creation(Ok(issued(PaymentProvider::NowPayments, "np-15", Money::from(50), CryptoCurrency::UsdtTrc20)));
    np.script_observation(Err(ProviderError::Protocol("unparseable reply".to_string())));
    np.script_observation(Ok(observation(PaymentProvider::NowPayments, PaymentStatus::Confirming, Some("tx-15"))));
    let api = api_with(vec![np], EventHooks::default());

    let receipt = api.issue_invoice(request_usdt("order-15", Money::from(50))).await.unwrap();
    let report = api.check_status(&receipt.invoice_id).await.unwrap();
    assert_eq!(report.status, PaymentStatus::Unknown, "an unintelligible reply is flagged, never guessed");

    let report = api.check_status(&receipt.invoice_id).await.unwrap();
    assert_eq!(report.status, PaymentStatus::Confirming);
}

#[tokio::test]
async fn the_expiry_sweep_retires_overdue_unpaid_invoices() {
    let (hooks, events) = audit_collector();
    let manual = Arc::new(
        ManualAdapter::new(tron_wallets(), Arc::new(ScriptedVerifier::new(vec![]))).with_expiry(Duration::hours(-1)),
    );
    let api = api_with(vec![manual], hooks);

    let receipt = api.issue_invoice(request_usdt("order-16", Money::from(50))).await.unwrap();
    let expired = api.expire_overdue_invoices().await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].invoice_id, receipt.invoice_id);
    assert_eq!(expired[0].status, PaymentStatus::Expired);

    wait_for_audit(&events, 2).await;
    let events = events.lock().unwrap();
    assert!(events.iter().any(|e| e.action == AuditAction::Expire));
}

#[tokio::test]
async fn currency_listing_and_fee_estimates_come_from_the_preferred_able_route() {
    let np = Arc::new(MockProvider::new(PaymentProvider::NowPayments));
    let manual = Arc::new(ManualAdapter::new(tron_wallets(), Arc::new(ScriptedVerifier::new(vec![]))));
    let api = api_with(vec![np, manual], EventHooks::default());

    // The mock provider defers (returns None), so the manual route answers.
    let currencies = api.supported_currencies().await.unwrap();
    assert_eq!(currencies.len(), 1);
    assert_eq!(currencies[0].currency, "USDT_TRC20");
    assert_eq!(currencies[0].min_amount, Money::from(1));

    let estimate = api.estimate_network_fee(CryptoCurrency::UsdtTrc20, Money::from(50)).await.unwrap();
    assert_eq!(estimate.network_fee, Money::from(1));
    assert_eq!(estimate.estimated_amount, Money::from(50));
}
