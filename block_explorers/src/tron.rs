use std::sync::Arc;

use cpg_common::{CryptoCurrency, Money, Secret};
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    config::{ExplorerConfig, REQUEST_TIMEOUT},
    data_objects::{ChainTransaction, VerifyOutcome},
    error::ExplorerApiError,
    helpers::{parse_base_units, USDT_CONTRACT_TRON},
};

const TRANSFER_PAGE_LIMIT: u32 = 50;

/// Client for the Trongrid account API.
///
/// TRON is the odd one out: the TRC20 transfer listing carries no confirmation data, so a
/// transfer only qualifies after a secondary lookup of the transaction by id shows that a block
/// number has been assigned to it.
#[derive(Clone)]
pub struct TrongridApi {
    base_url: String,
    client: Arc<Client>,
}

#[derive(Debug, Deserialize)]
struct Trc20Page {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Vec<Trc20Transfer>,
}

#[derive(Debug, Deserialize)]
struct Trc20Transfer {
    transaction_id: String,
    #[serde(default)]
    to: String,
    value: String,
    #[serde(default)]
    token_info: TokenInfo,
}

#[derive(Debug, Default, Deserialize)]
struct TokenInfo {
    #[serde(default)]
    address: String,
}

impl TrongridApi {
    pub fn new(config: &ExplorerConfig) -> Result<Self, ExplorerApiError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &config.trongrid_api_key {
            let val = HeaderValue::from_str(key.reveal().as_str())
                .map_err(|e| ExplorerApiError::Initialization(e.to_string()))?;
            headers.insert("TRON-PRO-API-KEY", val);
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| ExplorerApiError::Initialization(e.to_string()))?;
        Ok(Self { base_url: config.trongrid_url.trim_end_matches('/').to_string(), client: Arc::new(client) })
    }

    async fn recent_transfers(&self, address: &str) -> Result<Vec<Trc20Transfer>, ExplorerApiError> {
        let url = format!("{}/v1/accounts/{address}/transactions/trc20", self.base_url);
        let limit = TRANSFER_PAGE_LIMIT.to_string();
        let params = [("limit", limit.as_str()), ("contract_address", USDT_CONTRACT_TRON)];
        trace!("⛓️ GET {url}");
        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| ExplorerApiError::RequestFailed(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| ExplorerApiError::RequestFailed(e.to_string()))?;
            return Err(ExplorerApiError::UpstreamStatus { status, message });
        }
        let page = response.json::<Trc20Page>().await.map_err(|e| ExplorerApiError::JsonError(e.to_string()))?;
        if !page.success {
            return Err(ExplorerApiError::UpstreamRejected("Trongrid reported success=false".to_string()));
        }
        Ok(page.data)
    }

    /// Look the transaction up by id and return its block number, if one has been assigned yet.
    async fn transaction_block(&self, txid: &str) -> Result<Option<u64>, ExplorerApiError> {
        let url = format!("{}/wallet/gettransactionbyid", self.base_url);
        let body = serde_json::json!({ "value": txid });
        trace!("⛓️ POST {url} for {txid}");
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExplorerApiError::RequestFailed(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| ExplorerApiError::RequestFailed(e.to_string()))?;
            return Err(ExplorerApiError::UpstreamStatus { status, message });
        }
        let info = response.json::<Value>().await.map_err(|e| ExplorerApiError::JsonError(e.to_string()))?;
        Ok(info.get("blockNumber").and_then(Value::as_u64))
    }

    /// Scan recent TRC20 USDT transfers to `address` for one of at least `min_amount`, confirming
    /// candidates through the secondary transaction lookup.
    pub async fn verify(&self, address: &str, min_amount: Money) -> Result<VerifyOutcome, ExplorerApiError> {
        let transfers = self.recent_transfers(address).await?;
        debug!("⛓️ Trongrid returned {} USDT transfers for {address}", transfers.len());
        let decimals = CryptoCurrency::UsdtTrc20.decimals();
        let mut awaiting: Option<ChainTransaction> = None;
        let mut short: Option<&Trc20Transfer> = None;
        for tx in &transfers {
            if tx.to != address {
                continue;
            }
            if !tx.token_info.address.is_empty() && tx.token_info.address != USDT_CONTRACT_TRON {
                continue;
            }
            let amount = Money::from_base_units(parse_base_units(&tx.value)?, decimals)
                .map_err(|e| ExplorerApiError::InvalidAmount(e.to_string()))?;
            if amount >= min_amount {
                let block = self.transaction_block(&tx.transaction_id).await?;
                let confirmed = block.is_some();
                let observed = ChainTransaction {
                    txid: tx.transaction_id.clone(),
                    to_address: address.to_string(),
                    amount,
                    confirmed,
                    confirmations: confirmed.then_some(1),
                    block_height: block,
                };
                if confirmed {
                    debug!("⛓️ Qualifying TRC20 transfer {} ({amount} USDT) to {address}", tx.transaction_id);
                    return Ok(VerifyOutcome::Qualified(observed));
                }
                if awaiting.is_none() {
                    awaiting = Some(observed);
                }
            } else if short.is_none() {
                short = Some(tx);
            }
        }
        if let Some(tx) = awaiting {
            return Ok(VerifyOutcome::AwaitingConfirmation(tx));
        }
        // A smaller transfer only counts as a partial payment once it is actually in a block.
        if let Some(tx) = short {
            let block = self.transaction_block(&tx.transaction_id).await?;
            if let Some(block) = block {
                let amount = Money::from_base_units(parse_base_units(&tx.value)?, decimals)
                    .map_err(|e| ExplorerApiError::InvalidAmount(e.to_string()))?;
                return Ok(VerifyOutcome::Short(ChainTransaction {
                    txid: tx.transaction_id.clone(),
                    to_address: address.to_string(),
                    amount,
                    confirmed: true,
                    confirmations: Some(1),
                    block_height: Some(block),
                }));
            }
        }
        Ok(VerifyOutcome::NotFound)
    }
}
