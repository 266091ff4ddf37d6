use std::sync::Arc;

use cpg_common::{CryptoCurrency, Money, Network, Secret};
use log::*;
use reqwest::Client;
use serde::Deserialize;

use crate::{
    config::{ExplorerConfig, REQUEST_TIMEOUT},
    data_objects::{ChainTransaction, VerifyOutcome},
    error::ExplorerApiError,
    helpers::{parse_base_units, usdt_contract},
};

/// Client for the Etherscan wire protocol, which Ethereum and BSC explorers share. The same code
/// drives both networks; only the endpoint, token contract and decimal exponent differ.
#[derive(Clone)]
pub struct EtherscanFamilyApi {
    base_url: String,
    api_key: Option<Secret<String>>,
    contract: &'static str,
    currency: CryptoCurrency,
    client: Arc<Client>,
}

/// Etherscan wraps every reply in this envelope. `status` is "1" on success; "0" covers both
/// genuine faults and the "No transactions found" reply, which is an empty result set rather than
/// an error.
#[derive(Debug, Deserialize)]
struct EtherscanEnvelope {
    status: String,
    #[serde(default)]
    message: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TokenTx {
    hash: String,
    to: String,
    value: String,
    #[serde(default)]
    confirmations: String,
    #[serde(rename = "blockNumber", default)]
    block_number: String,
    #[serde(rename = "contractAddress", default)]
    contract_address: String,
}

impl EtherscanFamilyApi {
    pub fn ethereum(config: &ExplorerConfig) -> Result<Self, ExplorerApiError> {
        Self::new(config.etherscan_url.clone(), config.etherscan_api_key.clone(), CryptoCurrency::UsdtErc20)
    }

    pub fn bsc(config: &ExplorerConfig) -> Result<Self, ExplorerApiError> {
        Self::new(config.bscscan_url.clone(), config.bscscan_api_key.clone(), CryptoCurrency::UsdtBep20)
    }

    fn new(
        base_url: String,
        api_key: Option<Secret<String>>,
        currency: CryptoCurrency,
    ) -> Result<Self, ExplorerApiError> {
        let contract = usdt_contract(currency.network())
            .ok_or_else(|| ExplorerApiError::Initialization(format!("no USDT contract on {}", currency.network())))?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ExplorerApiError::Initialization(e.to_string()))?;
        Ok(Self { base_url, api_key, contract, currency, client: Arc::new(client) })
    }

    pub fn network(&self) -> Network {
        self.currency.network()
    }

    async fn token_transfers(&self, address: &str) -> Result<Vec<TokenTx>, ExplorerApiError> {
        let mut params = vec![
            ("module", "account"),
            ("action", "tokentx"),
            ("contractaddress", self.contract),
            ("address", address),
            ("page", "1"),
            ("offset", "100"),
            ("sort", "desc"),
        ];
        let key = self.api_key.as_ref().map(|k| k.reveal().clone());
        if let Some(key) = key.as_deref() {
            params.push(("apikey", key));
        }
        trace!("⛓️ GET {} tokentx for {address}", self.base_url);
        let response = self
            .client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| ExplorerApiError::RequestFailed(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| ExplorerApiError::RequestFailed(e.to_string()))?;
            return Err(ExplorerApiError::UpstreamStatus { status, message });
        }
        let envelope = response.json::<EtherscanEnvelope>().await.map_err(|e| ExplorerApiError::JsonError(e.to_string()))?;
        if envelope.status != "1" {
            if envelope.message.eq_ignore_ascii_case("No transactions found") {
                return Ok(Vec::new());
            }
            return Err(ExplorerApiError::UpstreamRejected(format!("{}: {}", envelope.message, envelope.result)));
        }
        serde_json::from_value(envelope.result).map_err(|e| ExplorerApiError::JsonError(e.to_string()))
    }

    /// Scan recent USDT token transfers to `address` for one of at least `min_amount`.
    ///
    /// Addresses are hex and compared case-insensitively. A transfer qualifies once the explorer
    /// reports at least one confirmation.
    pub async fn verify(&self, address: &str, min_amount: Money) -> Result<VerifyOutcome, ExplorerApiError> {
        let transfers = self.token_transfers(address).await?;
        debug!("⛓️ {} returned {} USDT transfers for {address}", self.network(), transfers.len());
        let decimals = self.currency.decimals();
        let mut awaiting: Option<ChainTransaction> = None;
        let mut short: Option<ChainTransaction> = None;
        for tx in &transfers {
            if !tx.to.eq_ignore_ascii_case(address) {
                continue;
            }
            if !tx.contract_address.is_empty() && !tx.contract_address.eq_ignore_ascii_case(self.contract) {
                continue;
            }
            let amount = Money::from_base_units(parse_base_units(&tx.value)?, decimals)
                .map_err(|e| ExplorerApiError::InvalidAmount(e.to_string()))?;
            let confirmations = tx.confirmations.parse::<u32>().unwrap_or(0);
            let confirmed = confirmations >= 1;
            let observed = ChainTransaction {
                txid: tx.hash.clone(),
                to_address: address.to_string(),
                amount,
                confirmed,
                confirmations: Some(confirmations),
                block_height: tx.block_number.parse::<u64>().ok(),
            };
            if amount >= min_amount {
                if confirmed {
                    debug!("⛓️ Qualifying transfer {} ({amount} USDT) to {address} on {}", tx.hash, self.network());
                    return Ok(VerifyOutcome::Qualified(observed));
                }
                if awaiting.is_none() {
                    awaiting = Some(observed);
                }
            } else if confirmed && short.is_none() {
                short = Some(observed);
            }
        }
        Ok(match (awaiting, short) {
            (Some(tx), _) => VerifyOutcome::AwaitingConfirmation(tx),
            (None, Some(tx)) => VerifyOutcome::Short(tx),
            (None, None) => VerifyOutcome::NotFound,
        })
    }
}
