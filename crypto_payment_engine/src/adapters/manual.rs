use std::{collections::HashMap, env, sync::Arc};

use async_trait::async_trait;
use block_explorers::VerifyOutcome;
use chrono::{Duration, Utc};
use cpg_common::{CryptoCurrency, Money, PaymentProvider, PaymentStatus};
use log::*;
use rust_decimal::Decimal;

use crate::{
    helpers,
    record_types::{Instructions, InvoiceRequest, PaymentRecord, StatusSource},
    traits::{ChainVerifier, CurrencyInfo, FeeEstimate, IssuedInvoice, ProviderAdapter, ProviderError, StatusObservation},
};

/// Manual invoices expire after a fixed day; the payer is told to send within that window.
pub const MANUAL_INVOICE_EXPIRY: Duration = Duration::hours(24);

//--------------------------------------     WalletConfig      -------------------------------------------------------
/// The merchant's receiving wallets, one per currency, injected at construction so environments
/// and tests get their own.
#[derive(Debug, Clone, Default)]
pub struct WalletConfig {
    wallets: HashMap<CryptoCurrency, String>,
    default_currency: Option<CryptoCurrency>,
}

impl WalletConfig {
    pub fn new(wallets: HashMap<CryptoCurrency, String>) -> Self {
        Self { wallets, default_currency: Some(CryptoCurrency::UsdtTrc20) }
    }

    pub fn with_default_currency(mut self, currency: CryptoCurrency) -> Self {
        self.default_currency = Some(currency);
        self
    }

    /// Reads `CPG_WALLET_BTC`, `CPG_WALLET_USDT_TRC20`, `CPG_WALLET_USDT_ERC20` and
    /// `CPG_WALLET_USDT_BEP20`.
    pub fn from_env() -> Self {
        let mut wallets = HashMap::new();
        for currency in CryptoCurrency::ALL {
            let var = format!("CPG_WALLET_{currency}");
            match env::var(&var) {
                Ok(address) if !address.trim().is_empty() => {
                    wallets.insert(currency, address);
                },
                _ => info!("🪛️ {var} is not set. Manual payments in {currency} are unavailable."),
            }
        }
        if wallets.is_empty() {
            warn!("🪛️ No manual payment wallets are configured. The manual route will reject every invoice.");
        }
        Self::new(wallets)
    }

    /// The wallet for the requested currency, or the default-currency wallet when the requested
    /// one has no wallet configured. Returns the currency actually served.
    pub fn wallet_for(&self, currency: CryptoCurrency) -> Option<(CryptoCurrency, &str)> {
        if let Some(address) = self.wallets.get(&currency) {
            return Some((currency, address.as_str()));
        }
        let fallback = self.default_currency?;
        self.wallets.get(&fallback).map(|address| (fallback, address.as_str()))
    }

    pub fn configured_currencies(&self) -> Vec<CryptoCurrency> {
        CryptoCurrency::ALL.into_iter().filter(|c| self.wallets.contains_key(c)).collect()
    }
}

//--------------------------------------     ManualAdapter     -------------------------------------------------------
/// The always-available fallback: no invoicing API, just a monitored wallet address. Status
/// checks delegate to the chain verifier for the invoice's network.
pub struct ManualAdapter {
    wallets: WalletConfig,
    verifier: Arc<dyn ChainVerifier>,
    expiry: Duration,
}

impl ManualAdapter {
    pub fn new(wallets: WalletConfig, verifier: Arc<dyn ChainVerifier>) -> Self {
        Self { wallets, verifier, expiry: MANUAL_INVOICE_EXPIRY }
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }
}

#[async_trait]
impl ProviderAdapter for ManualAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Manual
    }

    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<IssuedInvoice, ProviderError> {
        let (currency, address) = self
            .wallets
            .wallet_for(request.currency)
            .ok_or(ProviderError::UnsupportedCurrency(request.currency))?;
        if currency != request.currency {
            info!(
                "💰️ No {} wallet configured; serving order {} in {currency} instead",
                request.currency, request.order_id
            );
        }
        let invoice_id = helpers::manual_invoice_id();
        let expires_at = Utc::now() + self.expiry;
        debug!("💰️ Manual invoice {invoice_id} for order {}: {} {currency} to {address}", request.order_id, request.amount);
        Ok(IssuedInvoice {
            provider: PaymentProvider::Manual,
            invoice_id,
            address: address.to_string(),
            amount: request.amount,
            currency,
            expires_at: Some(expires_at),
            payment_url: None,
            instructions: Some(Instructions::for_payment(request.amount, currency)),
        })
    }

    async fn check_invoice(&self, record: &PaymentRecord) -> Result<StatusObservation, ProviderError> {
        let outcome = self.verifier.verify(record.currency, &record.address, record.expected_amount).await?;
        let source = StatusSource::ChainScan(record.currency.network());
        let observation = match outcome {
            VerifyOutcome::Qualified(tx) => StatusObservation {
                status: PaymentStatus::Completed,
                transaction_id: Some(tx.txid),
                amount_paid: Some(tx.amount),
                confirmations: tx.confirmations,
                source,
            },
            VerifyOutcome::AwaitingConfirmation(tx) => StatusObservation {
                status: PaymentStatus::Confirming,
                transaction_id: Some(tx.txid),
                amount_paid: Some(tx.amount),
                confirmations: tx.confirmations,
                source,
            },
            VerifyOutcome::Short(tx) => StatusObservation {
                status: PaymentStatus::Partial,
                transaction_id: None,
                amount_paid: Some(tx.amount),
                confirmations: tx.confirmations,
                source,
            },
            VerifyOutcome::NotFound => {
                let status = if record.is_expired_at(Utc::now()) {
                    debug!("💰️ Manual invoice {} is past its expiry with no payment in sight", record.invoice_id);
                    PaymentStatus::Expired
                } else {
                    PaymentStatus::Pending
                };
                StatusObservation { status, transaction_id: None, amount_paid: None, confirmations: None, source }
            },
        };
        Ok(observation)
    }

    async fn supported_currencies(&self) -> Result<Option<Vec<CurrencyInfo>>, ProviderError> {
        let list = self
            .wallets
            .configured_currencies()
            .into_iter()
            .map(|currency| {
                let (name, min_amount) = match currency {
                    CryptoCurrency::Btc => ("Bitcoin", Money::new(Decimal::new(1, 4))),
                    CryptoCurrency::UsdtTrc20 => ("Tether (TRC20)", Money::new(Decimal::ONE)),
                    CryptoCurrency::UsdtErc20 => ("Tether (ERC20)", Money::new(Decimal::ONE)),
                    CryptoCurrency::UsdtBep20 => ("Tether (BEP20)", Money::new(Decimal::ONE)),
                };
                CurrencyInfo {
                    currency: currency.to_string(),
                    name: name.to_string(),
                    network: currency.network().to_string(),
                    min_amount,
                }
            })
            .collect();
        Ok(Some(list))
    }

    async fn estimate_fee(&self, currency: CryptoCurrency, amount: Money) -> Result<Option<FeeEstimate>, ProviderError> {
        // Flat estimates for the direct-wallet route: 0.1% for BTC, a fixed USDT fee for the
        // token networks.
        let network_fee = match currency {
            CryptoCurrency::Btc => Money::new(amount.value() * Decimal::new(1, 3)),
            CryptoCurrency::UsdtTrc20 => Money::new(Decimal::ONE),
            CryptoCurrency::UsdtErc20 => Money::new(Decimal::from(5)),
            CryptoCurrency::UsdtBep20 => Money::new(Decimal::ONE),
        };
        Ok(Some(FeeEstimate { estimated_amount: amount, currency, network_fee, service_fee: Money::ZERO }))
    }
}
