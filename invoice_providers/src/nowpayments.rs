use std::{fmt::Display, sync::Arc};

use chrono::{DateTime, Utc};
use cpg_common::{CryptoCurrency, Money, PaymentStatus};
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use rust_decimal::prelude::ToPrimitive;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    config::{NowPaymentsConfig, REQUEST_TIMEOUT},
    error::ProviderApiError,
    helpers::{opt_flexible_f64, opt_string_or_number, string_or_number},
};

//--------------------------------------    NowPaymentsApi    --------------------------------------------------------
#[derive(Clone)]
pub struct NowPaymentsApi {
    config: NowPaymentsConfig,
    client: Arc<Client>,
}

impl NowPaymentsApi {
    pub fn new(config: NowPaymentsConfig) -> Result<Self, ProviderApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        let val = HeaderValue::from_str(config.api_key.reveal().as_str())
            .map_err(|e| ProviderApiError::Initialization(e.to_string()))?;
        headers.insert("x-api-key", val);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| ProviderApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<B>,
    ) -> Result<T, ProviderApiError> {
        let url = format!("{}{path}", self.config.base_url.trim_end_matches('/'));
        trace!("🧾️ NowPayments query: {url}");
        let mut req = self.client.request(method, url);
        if !params.is_empty() {
            req = req.query(params);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| ProviderApiError::RequestFailed(e.to_string()))?;
        if response.status().is_success() {
            response.json::<T>().await.map_err(|e| ProviderApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| ProviderApiError::RequestFailed(e.to_string()))?;
            Err(ProviderApiError::QueryError { status, message })
        }
    }

    /// Create a hosted invoice. The requested amount is priced in USD; NowPayments converts it
    /// into the payable crypto amount and assigns the deposit address.
    pub async fn create_invoice(
        &self,
        amount: Money,
        currency: CryptoCurrency,
        order_id: &str,
        description: &str,
    ) -> Result<NowPaymentsInvoice, ProviderApiError> {
        let price_amount = amount
            .value()
            .to_f64()
            .ok_or_else(|| ProviderApiError::InvalidAmount(amount.to_string()))?;
        let body = serde_json::json!({
            "price_amount": price_amount,
            "price_currency": "USD",
            "pay_currency": currency.to_string(),
            "order_id": order_id,
            "order_description": description,
            "ipn_callback_url": self.config.ipn_callback_url(),
            "success_url": self.config.success_url(),
            "cancel_url": self.config.cancel_url(),
        });
        debug!("🧾️ Creating NowPayments invoice for order {order_id}");
        let invoice = self
            .rest_query::<NowPaymentsInvoice, serde_json::Value>(Method::POST, "/invoice", &[], Some(body))
            .await?;
        info!("🧾️ NowPayments invoice {} created for order {order_id}", invoice.id);
        Ok(invoice)
    }

    /// Fetch the current state of an invoice.
    pub async fn invoice_status(&self, invoice_id: &str) -> Result<NowPaymentsInvoiceStatus, ProviderApiError> {
        let path = format!("/invoice/{invoice_id}");
        self.rest_query::<NowPaymentsInvoiceStatus, ()>(Method::GET, &path, &[], None).await
    }

    /// The currency tickers NowPayments will accept payment in.
    pub async fn currencies(&self) -> Result<Vec<String>, ProviderApiError> {
        #[derive(Deserialize)]
        struct CurrenciesResponse {
            #[serde(default)]
            currencies: Vec<String>,
        }
        let result = self.rest_query::<CurrenciesResponse, ()>(Method::GET, "/currencies", &[], None).await?;
        Ok(result.currencies)
    }

    /// Estimate the crypto amount and fees for a USD-priced payment.
    pub async fn estimate(&self, amount: Money, currency: CryptoCurrency) -> Result<NowPaymentsEstimate, ProviderApiError> {
        let amount = amount
            .value()
            .to_f64()
            .ok_or_else(|| ProviderApiError::InvalidAmount(amount.to_string()))?
            .to_string();
        let currency = currency.to_string();
        let params = [
            ("amount", amount.as_str()),
            ("currency_from", "USD"),
            ("currency_to", currency.as_str()),
        ];
        self.rest_query::<NowPaymentsEstimate, ()>(Method::GET, "/estimate", &params, None).await
    }
}

//--------------------------------------   response objects   --------------------------------------------------------
#[derive(Debug, Clone, Deserialize)]
pub struct NowPaymentsInvoice {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub invoice_url: Option<String>,
    pub pay_address: Option<String>,
    #[serde(default, deserialize_with = "opt_flexible_f64")]
    pub pay_amount: Option<f64>,
    pub pay_currency: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NowPaymentsInvoiceStatus {
    pub payment_status: Option<NowPaymentsStatus>,
    #[serde(default, deserialize_with = "opt_flexible_f64")]
    pub actually_paid: Option<f64>,
    #[serde(default, deserialize_with = "opt_flexible_f64")]
    pub pay_amount: Option<f64>,
    pub pay_currency: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub payment_id: Option<String>,
}

impl NowPaymentsInvoiceStatus {
    /// A reply with no `payment_status` field means the invoice has seen no payment yet.
    pub fn status(&self) -> NowPaymentsStatus {
        self.payment_status.unwrap_or(NowPaymentsStatus::Waiting)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NowPaymentsEstimate {
    #[serde(default, deserialize_with = "opt_flexible_f64")]
    pub estimated_amount: Option<f64>,
    #[serde(default, deserialize_with = "opt_flexible_f64")]
    pub network_fee: Option<f64>,
    #[serde(default, deserialize_with = "opt_flexible_f64")]
    pub service_fee: Option<f64>,
}

//--------------------------------------  NowPaymentsStatus   --------------------------------------------------------
/// The NowPayments status vocabulary. Values the API adds later deserialise to `Unknown`, which
/// maps canonically to `unknown` — flagged for manual review, never guessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NowPaymentsStatus {
    Waiting,
    Confirming,
    Confirmed,
    Sending,
    PartiallyPaid,
    Finished,
    Failed,
    Refunded,
    Expired,
    #[serde(other)]
    Unknown,
}

impl NowPaymentsStatus {
    pub const ALL: [NowPaymentsStatus; 10] = [
        NowPaymentsStatus::Waiting,
        NowPaymentsStatus::Confirming,
        NowPaymentsStatus::Confirmed,
        NowPaymentsStatus::Sending,
        NowPaymentsStatus::PartiallyPaid,
        NowPaymentsStatus::Finished,
        NowPaymentsStatus::Failed,
        NowPaymentsStatus::Refunded,
        NowPaymentsStatus::Expired,
        NowPaymentsStatus::Unknown,
    ];

    /// The fixed mapping from the native vocabulary onto the canonical lifecycle.
    pub fn canonical(&self) -> PaymentStatus {
        match self {
            NowPaymentsStatus::Waiting => PaymentStatus::Pending,
            NowPaymentsStatus::Confirming => PaymentStatus::Confirming,
            NowPaymentsStatus::Confirmed | NowPaymentsStatus::Sending => PaymentStatus::Confirmed,
            NowPaymentsStatus::PartiallyPaid => PaymentStatus::Partial,
            NowPaymentsStatus::Finished => PaymentStatus::Completed,
            NowPaymentsStatus::Failed => PaymentStatus::Failed,
            NowPaymentsStatus::Refunded => PaymentStatus::Refunded,
            NowPaymentsStatus::Expired => PaymentStatus::Expired,
            NowPaymentsStatus::Unknown => PaymentStatus::Unknown,
        }
    }
}

impl Display for NowPaymentsStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NowPaymentsStatus::Waiting => "waiting",
            NowPaymentsStatus::Confirming => "confirming",
            NowPaymentsStatus::Confirmed => "confirmed",
            NowPaymentsStatus::Sending => "sending",
            NowPaymentsStatus::PartiallyPaid => "partially_paid",
            NowPaymentsStatus::Finished => "finished",
            NowPaymentsStatus::Failed => "failed",
            NowPaymentsStatus::Refunded => "refunded",
            NowPaymentsStatus::Expired => "expired",
            NowPaymentsStatus::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}
