use cpg_common::{CryptoCurrency, Money, Network};
use log::*;

use crate::{
    config::ExplorerConfig,
    data_objects::VerifyOutcome,
    error::ExplorerApiError,
    esplora::EsploraApi,
    etherscan::EtherscanFamilyApi,
    tron::TrongridApi,
};

/// One verifier per supported network, dispatched by currency.
#[derive(Clone)]
pub struct ChainVerifiers {
    esplora: EsploraApi,
    ethereum: EtherscanFamilyApi,
    bsc: EtherscanFamilyApi,
    tron: TrongridApi,
}

impl ChainVerifiers {
    pub fn new(config: &ExplorerConfig) -> Result<Self, ExplorerApiError> {
        Ok(Self {
            esplora: EsploraApi::new(config)?,
            ethereum: EtherscanFamilyApi::ethereum(config)?,
            bsc: EtherscanFamilyApi::bsc(config)?,
            tron: TrongridApi::new(config)?,
        })
    }

    /// Scan the network carrying `currency` for a qualifying transfer of at least `min_amount`
    /// to `address`.
    pub async fn verify_for(
        &self,
        currency: CryptoCurrency,
        address: &str,
        min_amount: Money,
    ) -> Result<VerifyOutcome, ExplorerApiError> {
        debug!("⛓️ Verifying {min_amount} {currency} to {address}");
        match currency.network() {
            Network::Bitcoin => self.esplora.verify(address, min_amount).await,
            Network::Ethereum => self.ethereum.verify(address, min_amount).await,
            Network::Bsc => self.bsc.verify(address, min_amount).await,
            Network::Tron => self.tron.verify(address, min_amount).await,
        }
    }
}
