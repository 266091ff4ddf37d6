use std::sync::Arc;

use cpg_common::{CryptoCurrency, Money};
use log::*;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};

use crate::{
    config::{ExplorerConfig, REQUEST_TIMEOUT},
    data_objects::{ChainTransaction, VerifyOutcome},
    error::ExplorerApiError,
};

/// Client for Esplora-style Bitcoin explorers (blockstream.info and compatible).
#[derive(Clone)]
pub struct EsploraApi {
    base_url: String,
    client: Arc<Client>,
}

#[derive(Debug, Deserialize)]
struct EsploraTx {
    txid: String,
    #[serde(default)]
    vout: Vec<EsploraVout>,
    status: EsploraTxStatus,
}

#[derive(Debug, Deserialize)]
struct EsploraVout {
    scriptpubkey_address: Option<String>,
    value: u64,
}

#[derive(Debug, Deserialize)]
struct EsploraTxStatus {
    confirmed: bool,
    block_height: Option<u64>,
}

impl EsploraApi {
    pub fn new(config: &ExplorerConfig) -> Result<Self, ExplorerApiError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ExplorerApiError::Initialization(e.to_string()))?;
        Ok(Self { base_url: config.esplora_url.trim_end_matches('/').to_string(), client: Arc::new(client) })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ExplorerApiError> {
        let url = format!("{}{path}", self.base_url);
        trace!("⛓️ GET {url}");
        let response = self.client.get(&url).send().await.map_err(|e| ExplorerApiError::RequestFailed(e.to_string()))?;
        if response.status().is_success() {
            response.json::<T>().await.map_err(|e| ExplorerApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| ExplorerApiError::RequestFailed(e.to_string()))?;
            Err(ExplorerApiError::UpstreamStatus { status, message })
        }
    }

    /// Scan the most recent transactions to `address` for a transfer of at least `min_amount`.
    ///
    /// The endpoint serves the newest ~50 transactions, newest first; the first qualifying
    /// transfer wins. A Bitcoin transfer qualifies once its transaction is included in a block.
    pub async fn verify(&self, address: &str, min_amount: Money) -> Result<VerifyOutcome, ExplorerApiError> {
        let txs: Vec<EsploraTx> = self.get_json(&format!("/address/{address}/txs")).await?;
        debug!("⛓️ Esplora returned {} transactions for {address}", txs.len());
        let decimals = CryptoCurrency::Btc.decimals();
        let mut awaiting: Option<ChainTransaction> = None;
        let mut short: Option<ChainTransaction> = None;
        for tx in &txs {
            for output in &tx.vout {
                if output.scriptpubkey_address.as_deref() != Some(address) {
                    continue;
                }
                let amount = Money::from_base_units(u128::from(output.value), decimals)
                    .map_err(|e| ExplorerApiError::InvalidAmount(e.to_string()))?;
                let confirmed = tx.status.confirmed;
                let observed = ChainTransaction {
                    txid: tx.txid.clone(),
                    to_address: address.to_string(),
                    amount,
                    confirmed,
                    confirmations: confirmed.then_some(1),
                    block_height: tx.status.block_height,
                };
                if amount >= min_amount {
                    if confirmed {
                        debug!("⛓️ Qualifying BTC transfer {} ({amount} BTC) to {address}", tx.txid);
                        return Ok(VerifyOutcome::Qualified(observed));
                    }
                    if awaiting.is_none() {
                        awaiting = Some(observed);
                    }
                } else if confirmed && short.is_none() {
                    short = Some(observed);
                }
            }
        }
        Ok(match (awaiting, short) {
            (Some(tx), _) => VerifyOutcome::AwaitingConfirmation(tx),
            (None, Some(tx)) => VerifyOutcome::Short(tx),
            (None, None) => VerifyOutcome::NotFound,
        })
    }
}
