use std::{collections::HashMap, fmt::Display, sync::Arc};

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
    config::{BtcPayConfig, REQUEST_TIMEOUT},
    error::ProviderApiError,
    helpers::{opt_flexible_f64, opt_flexible_i64, string_or_number},
};

//--------------------------------------      BtcPayApi       --------------------------------------------------------
#[derive(Clone)]
pub struct BtcPayApi {
    config: BtcPayConfig,
    client: Arc<Client>,
}

impl BtcPayApi {
    pub fn new(config: BtcPayConfig) -> Result<Self, ProviderApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        let val = HeaderValue::from_str(&format!("token {}", config.api_key.reveal()))
            .map_err(|e| ProviderApiError::Initialization(e.to_string()))?;
        headers.insert("Authorization", val);
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
        body: Option<B>,
    ) -> Result<T, ProviderApiError> {
        let url = format!("{}{path}", self.config.base_url.trim_end_matches('/'));
        trace!("🧾️ BTCPay query: {url}");
        let mut req = self.client.request(method, url);
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

    /// Create an invoice on the self-hosted BTCPay instance. The amount is priced in USD; BTCPay
    /// assigns per-currency deposit addresses and the converted crypto amount.
    pub async fn create_invoice(
        &self,
        amount: Money,
        currency: CryptoCurrency,
        order_id: &str,
        description: &str,
    ) -> Result<BtcPayInvoice, ProviderApiError> {
        let amount = amount
            .value()
            .to_f64()
            .ok_or_else(|| ProviderApiError::InvalidAmount(amount.to_string()))?;
        let body = serde_json::json!({
            "amount": amount,
            "currency": "USD",
            "orderId": order_id,
            "itemDesc": description,
            "notificationURL": self.config.notification_url(),
            "redirectURL": self.config.redirect_url(),
        });
        debug!("🧾️ Creating BTCPay invoice for order {order_id} ({currency})");
        let invoice = self
            .rest_query::<BtcPayInvoice, serde_json::Value>(Method::POST, "/api/v1/invoices", Some(body))
            .await?;
        info!("🧾️ BTCPay invoice {} created for order {order_id}", invoice.id);
        Ok(invoice)
    }

    pub async fn invoice_status(&self, invoice_id: &str) -> Result<BtcPayInvoiceStatus, ProviderApiError> {
        let path = format!("/api/v1/invoices/{invoice_id}");
        self.rest_query::<BtcPayInvoiceStatus, ()>(Method::GET, &path, None).await
    }
}

//--------------------------------------   response objects   --------------------------------------------------------
#[derive(Debug, Clone, Deserialize)]
pub struct BtcPayInvoice {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub url: Option<String>,
    /// Deposit address per currency ticker.
    #[serde(default)]
    pub addresses: HashMap<String, String>,
    #[serde(default, rename = "cryptoInfo")]
    pub crypto_info: Vec<BtcPayCryptoInfo>,
    /// Millisecond epoch timestamp.
    #[serde(default, rename = "expirationTime", deserialize_with = "opt_flexible_i64")]
    pub expiration_time: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BtcPayCryptoInfo {
    #[serde(default, rename = "cryptoAmount")]
    pub crypto_amount: Option<String>,
}

impl BtcPayInvoice {
    pub fn address_for(&self, currency: CryptoCurrency) -> Option<&str> {
        self.addresses.get(currency.as_str()).map(String::as_str)
    }

    pub fn crypto_amount(&self) -> Option<&str> {
        self.crypto_info.first().and_then(|info| info.crypto_amount.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BtcPayInvoiceStatus {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub status: Option<BtcPayStatus>,
    #[serde(default, deserialize_with = "opt_flexible_f64")]
    pub price: Option<f64>,
    pub currency: Option<String>,
}

impl BtcPayInvoiceStatus {
    /// A reply without a status field is a freshly created invoice.
    pub fn status(&self) -> BtcPayStatus {
        self.status.unwrap_or(BtcPayStatus::New)
    }
}

//--------------------------------------     BtcPayStatus     --------------------------------------------------------
/// The BTCPay invoice state vocabulary, spelled exactly as the API serves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BtcPayStatus {
    New,
    Paid,
    Confirmed,
    Complete,
    Expired,
    Invalid,
    #[serde(other)]
    Unknown,
}

impl BtcPayStatus {
    pub const ALL: [BtcPayStatus; 7] = [
        BtcPayStatus::New,
        BtcPayStatus::Paid,
        BtcPayStatus::Confirmed,
        BtcPayStatus::Complete,
        BtcPayStatus::Expired,
        BtcPayStatus::Invalid,
        BtcPayStatus::Unknown,
    ];

    /// The fixed mapping from the native vocabulary onto the canonical lifecycle.
    pub fn canonical(&self) -> PaymentStatus {
        match self {
            BtcPayStatus::New => PaymentStatus::Pending,
            BtcPayStatus::Paid => PaymentStatus::Confirming,
            BtcPayStatus::Confirmed => PaymentStatus::Confirmed,
            BtcPayStatus::Complete => PaymentStatus::Completed,
            BtcPayStatus::Expired => PaymentStatus::Expired,
            BtcPayStatus::Invalid => PaymentStatus::Failed,
            BtcPayStatus::Unknown => PaymentStatus::Unknown,
        }
    }
}

impl Display for BtcPayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BtcPayStatus::New => "New",
            BtcPayStatus::Paid => "Paid",
            BtcPayStatus::Confirmed => "Confirmed",
            BtcPayStatus::Complete => "Complete",
            BtcPayStatus::Expired => "Expired",
            BtcPayStatus::Invalid => "Invalid",
            BtcPayStatus::Unknown => "Unknown",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn canonical_table_is_exhaustive() {
        let expected = [
            (BtcPayStatus::New, PaymentStatus::Pending),
            (BtcPayStatus::Paid, PaymentStatus::Confirming),
            (BtcPayStatus::Confirmed, PaymentStatus::Confirmed),
            (BtcPayStatus::Complete, PaymentStatus::Completed),
            (BtcPayStatus::Expired, PaymentStatus::Expired),
            (BtcPayStatus::Invalid, PaymentStatus::Failed),
            (BtcPayStatus::Unknown, PaymentStatus::Unknown),
        ];
        assert_eq!(expected.len(), BtcPayStatus::ALL.len());
        for (native, canonical) in expected {
            assert_eq!(native.canonical(), canonical, "{native} maps to {canonical}");
        }
    }

    #[test]
    fn unmapped_native_values_fall_back_to_unknown() {
        let status: BtcPayStatus = serde_json::from_str("\"Settled\"").unwrap();
        assert_eq!(status, BtcPayStatus::Unknown);
    }

    #[test]
    fn addresses_are_keyed_by_currency_ticker() {
        let invoice: BtcPayInvoice = serde_json::from_str(
            r#"{"id": "inv1", "addresses": {"BTC": "bc1qexample"}, "cryptoInfo": [{"cryptoAmount": "0.0123"}]}"#,
        )
        .unwrap();
        assert_eq!(invoice.address_for(CryptoCurrency::Btc), Some("bc1qexample"));
        assert_eq!(invoice.address_for(CryptoCurrency::UsdtTrc20), None);
        assert_eq!(invoice.crypto_amount(), Some("0.0123"));
    }
}
