use std::{env, time::Duration};

use cpg_common::Secret;
use log::*;

pub const DEFAULT_NOWPAYMENTS_URL: &str = "https://api.nowpayments.io/v1";

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// NowPayments credentials and callback endpoints.
///
/// `from_env()` returns `None` when no API key is configured; the orchestrator uses that to skip
/// the provider in its fixed preference order.
#[derive(Debug, Clone)]
pub struct NowPaymentsConfig {
    pub base_url: String,
    pub api_key: Secret<String>,
    /// Public base URL of this deployment, used to build the IPN callback and redirect URLs.
    pub public_base_url: String,
}

impl NowPaymentsConfig {
    pub fn new<S: Into<String>>(base_url: S, api_key: Secret<String>, public_base_url: S) -> Self {
        Self { base_url: base_url.into(), api_key, public_base_url: public_base_url.into() }
    }

    pub fn from_env() -> Option<Self> {
        let api_key = match env::var("CPG_NOWPAYMENTS_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Secret::new(key),
            _ => {
                info!("🪛️ CPG_NOWPAYMENTS_API_KEY is not set. NowPayments invoicing is disabled.");
                return None;
            },
        };
        let base_url = env::var("CPG_NOWPAYMENTS_URL").unwrap_or_else(|_| DEFAULT_NOWPAYMENTS_URL.to_string());
        Some(Self { base_url, api_key, public_base_url: public_base_url_from_env() })
    }

    pub fn ipn_callback_url(&self) -> String {
        format!("{}/api/payments/callback", self.public_base_url)
    }

    pub fn success_url(&self) -> String {
        format!("{}/payment/success", self.public_base_url)
    }

    pub fn cancel_url(&self) -> String {
        format!("{}/payment/cancel", self.public_base_url)
    }
}

/// BTCPay Server connection details. Self-hosted, so there is no default URL.
#[derive(Debug, Clone)]
pub struct BtcPayConfig {
    pub base_url: String,
    pub api_key: Secret<String>,
    pub public_base_url: String,
}

impl BtcPayConfig {
    pub fn new<S: Into<String>>(base_url: S, api_key: Secret<String>, public_base_url: S) -> Self {
        Self { base_url: base_url.into(), api_key, public_base_url: public_base_url.into() }
    }

    pub fn from_env() -> Option<Self> {
        let base_url = match env::var("CPG_BTCPAY_URL") {
            Ok(url) if !url.trim().is_empty() => url,
            _ => {
                info!("🪛️ CPG_BTCPAY_URL is not set. BTCPay invoicing is disabled.");
                return None;
            },
        };
        let api_key = match env::var("CPG_BTCPAY_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Secret::new(key),
            _ => {
                warn!("🪛️ CPG_BTCPAY_URL is set but CPG_BTCPAY_API_KEY is missing. BTCPay invoicing is disabled.");
                return None;
            },
        };
        Some(Self { base_url, api_key, public_base_url: public_base_url_from_env() })
    }

    pub fn notification_url(&self) -> String {
        format!("{}/api/payments/btcpay-callback", self.public_base_url)
    }

    pub fn redirect_url(&self) -> String {
        format!("{}/payment/success", self.public_base_url)
    }
}

fn public_base_url_from_env() -> String {
    env::var("CPG_PUBLIC_BASE_URL").unwrap_or_else(|_| {
        warn!("🪛️ CPG_PUBLIC_BASE_URL is not set. Provider callbacks will point at a placeholder domain.");
        "https://example.invalid".to_string()
    })
}
