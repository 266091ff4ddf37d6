use async_trait::async_trait;
use cpg_common::{CryptoCurrency, Money, PaymentProvider};
use invoice_providers::{NowPaymentsApi, NowPaymentsConfig};
use log::*;
use rust_decimal::Decimal;

use crate::{
    record_types::{InvoiceRequest, PaymentRecord, StatusSource},
    traits::{CurrencyInfo, FeeEstimate, IssuedInvoice, ProviderAdapter, ProviderError, StatusObservation},
};

/// The commercial hosted provider. Preferred whenever credentials are configured.
pub struct NowPaymentsAdapter {
    api: NowPaymentsApi,
}

impl NowPaymentsAdapter {
    pub fn new(config: NowPaymentsConfig) -> Result<Self, ProviderError> {
        let api = NowPaymentsApi::new(config)?;
        Ok(Self { api })
    }

    pub fn from_api(api: NowPaymentsApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ProviderAdapter for NowPaymentsAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::NowPayments
    }

    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<IssuedInvoice, ProviderError> {
        let invoice = self
            .api
            .create_invoice(request.amount, request.currency, request.order_id.as_str(), &request.description_or_default())
            .await?;
        let address = invoice
            .pay_address
            .ok_or_else(|| ProviderError::Protocol("invoice reply carried no pay_address".to_string()))?;
        let amount = match invoice.pay_amount {
            Some(paid) => Money::from_f64(paid).map_err(|e| ProviderError::Protocol(e.to_string()))?,
            None => request.amount,
        };
        Ok(IssuedInvoice {
            provider: PaymentProvider::NowPayments,
            invoice_id: invoice.id,
            address,
            amount,
            currency: request.currency,
            // NowPayments manages invoice expiry itself and reports it as a status.
            expires_at: None,
            payment_url: invoice.invoice_url,
            instructions: None,
        })
    }

    async fn check_invoice(&self, record: &PaymentRecord) -> Result<StatusObservation, ProviderError> {
        let reply = self.api.invoice_status(&record.invoice_id).await?;
        let native = reply.status();
        let status = native.canonical();
        trace!("🧾️ NowPayments reports '{native}' ('{status}') for invoice {}", record.invoice_id);
        let amount_paid = match reply.actually_paid {
            Some(paid) => Some(Money::from_f64(paid).map_err(|e| ProviderError::Protocol(e.to_string()))?),
            None => None,
        };
        Ok(StatusObservation {
            status,
            transaction_id: reply.payment_id,
            amount_paid,
            confirmations: None,
            source: StatusSource::Provider(PaymentProvider::NowPayments),
        })
    }

    async fn supported_currencies(&self) -> Result<Option<Vec<CurrencyInfo>>, ProviderError> {
        let tickers = self.api.currencies().await?;
        let list = tickers
            .into_iter()
            .map(|ticker| CurrencyInfo {
                name: ticker.clone(),
                currency: ticker,
                network: "auto".to_string(),
                min_amount: Money::new(Decimal::new(1, 3)),
            })
            .collect();
        Ok(Some(list))
    }

    async fn estimate_fee(&self, currency: CryptoCurrency, amount: Money) -> Result<Option<FeeEstimate>, ProviderError> {
        let estimate = self.api.estimate(amount, currency).await?;
        let to_money = |value: Option<f64>| -> Result<Money, ProviderError> {
            match value {
                Some(v) => Money::from_f64(v).map_err(|e| ProviderError::Protocol(e.to_string())),
                None => Ok(Money::ZERO),
            }
        };
        let estimated_amount = match estimate.estimated_amount {
            Some(v) => Money::from_f64(v).map_err(|e| ProviderError::Protocol(e.to_string()))?,
            None => amount,
        };
        Ok(Some(FeeEstimate {
            estimated_amount,
            currency,
            network_fee: to_money(estimate.network_fee)?,
            service_fee: to_money(estimate.service_fee)?,
        }))
    }
}
