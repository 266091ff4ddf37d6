use async_trait::async_trait;
use chrono::TimeZone;
use cpg_common::{Money, PaymentProvider};
use invoice_providers::{BtcPayApi, BtcPayConfig};
use log::*;

use crate::{
    record_types::{InvoiceRequest, PaymentRecord, StatusSource},
    traits::{IssuedInvoice, ProviderAdapter, ProviderError, StatusObservation},
};

/// The self-hosted provider. Second in preference order, after NowPayments.
pub struct BtcPayAdapter {
    api: BtcPayApi,
}

impl BtcPayAdapter {
    pub fn new(config: BtcPayConfig) -> Result<Self, ProviderError> {
        let api = BtcPayApi::new(config)?;
        Ok(Self { api })
    }

    pub fn from_api(api: BtcPayApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ProviderAdapter for BtcPayAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::BtcPay
    }

    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<IssuedInvoice, ProviderError> {
        let invoice = self
            .api
            .create_invoice(request.amount, request.currency, request.order_id.as_str(), &request.description_or_default())
            .await?;
        let address = invoice
            .address_for(request.currency)
            .ok_or_else(|| {
                ProviderError::Protocol(format!("BTCPay invoice carries no {} deposit address", request.currency))
            })?
            .to_string();
        let amount = match invoice.crypto_amount() {
            Some(raw) => raw.parse::<Money>().map_err(|e| ProviderError::Protocol(e.to_string()))?,
            None => request.amount,
        };
        let expires_at = invoice.expiration_time.and_then(|ms| chrono::Utc.timestamp_millis_opt(ms).single());
        Ok(IssuedInvoice {
            provider: PaymentProvider::BtcPay,
            invoice_id: invoice.id,
            address,
            amount,
            currency: request.currency,
            expires_at,
            payment_url: invoice.url,
            instructions: None,
        })
    }

    async fn check_invoice(&self, record: &PaymentRecord) -> Result<StatusObservation, ProviderError> {
        let reply = self.api.invoice_status(&record.invoice_id).await?;
        let native = reply.status();
        let status = native.canonical();
        trace!("🧾️ BTCPay reports '{native}' ('{status}') for invoice {}", record.invoice_id);
        let amount_paid = match reply.price {
            Some(paid) => Some(Money::from_f64(paid).map_err(|e| ProviderError::Protocol(e.to_string()))?),
            None => None,
        };
        // BTCPay does not surface the on-chain txid through this endpoint; the invoice id is the
        // durable transaction reference it gives us.
        Ok(StatusObservation {
            status,
            transaction_id: Some(reply.id),
            amount_paid,
            confirmations: None,
            source: StatusSource::Provider(PaymentProvider::BtcPay),
        })
    }
}
