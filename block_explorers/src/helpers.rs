use cpg_common::Network;

use crate::ExplorerApiError;

/// The fixed USDT token contract per network. Transfers involving any other contract are ignored
/// by the verifiers.
pub const USDT_CONTRACT_ETH: &str = "0xdAC17F958D2ee523a2206206994597C13D831ec7";
pub const USDT_CONTRACT_TRON: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";
pub const USDT_CONTRACT_BSC: &str = "0x55d398326f99059fF775485246999027B3197955";

pub fn usdt_contract(network: Network) -> Option<&'static str> {
    match network {
        Network::Ethereum => Some(USDT_CONTRACT_ETH),
        Network::Tron => Some(USDT_CONTRACT_TRON),
        Network::Bsc => Some(USDT_CONTRACT_BSC),
        Network::Bitcoin => None,
    }
}

/// Token transfer values arrive as decimal strings of base units.
pub fn parse_base_units(raw: &str) -> Result<u128, ExplorerApiError> {
    raw.parse::<u128>().map_err(|e| ExplorerApiError::InvalidAmount(format!("{raw}: {e}")))
}
