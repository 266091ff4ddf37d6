use std::{env, time::Duration};

use cpg_common::Secret;
use log::*;

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub const DEFAULT_ESPLORA_URL: &str = "https://blockstream.info/api";
pub const DEFAULT_ETHERSCAN_URL: &str = "https://api.etherscan.io/api";
pub const DEFAULT_BSCSCAN_URL: &str = "https://api.bscscan.com/api";
pub const DEFAULT_TRONGRID_URL: &str = "https://api.trongrid.io";

/// Endpoints and credentials for the block-explorer APIs.
///
/// The Etherscan-family keys are optional: both Etherscan and BscScan serve unauthenticated
/// queries at a reduced rate limit. Trongrid without a key is heavily throttled but functional.
#[derive(Debug, Clone)]
pub struct ExplorerConfig {
    pub esplora_url: String,
    pub etherscan_url: String,
    pub etherscan_api_key: Option<Secret<String>>,
    pub bscscan_url: String,
    pub bscscan_api_key: Option<Secret<String>>,
    pub trongrid_url: String,
    pub trongrid_api_key: Option<Secret<String>>,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            esplora_url: DEFAULT_ESPLORA_URL.to_string(),
            etherscan_url: DEFAULT_ETHERSCAN_URL.to_string(),
            etherscan_api_key: None,
            bscscan_url: DEFAULT_BSCSCAN_URL.to_string(),
            bscscan_api_key: None,
            trongrid_url: DEFAULT_TRONGRID_URL.to_string(),
            trongrid_api_key: None,
        }
    }
}

impl ExplorerConfig {
    pub fn from_env_or_default() -> Self {
        let esplora_url = env::var("CPG_ESPLORA_URL").unwrap_or_else(|_| DEFAULT_ESPLORA_URL.to_string());
        let etherscan_url = env::var("CPG_ETHERSCAN_URL").unwrap_or_else(|_| DEFAULT_ETHERSCAN_URL.to_string());
        let bscscan_url = env::var("CPG_BSCSCAN_URL").unwrap_or_else(|_| DEFAULT_BSCSCAN_URL.to_string());
        let trongrid_url = env::var("CPG_TRONGRID_URL").unwrap_or_else(|_| DEFAULT_TRONGRID_URL.to_string());
        let etherscan_api_key = read_key("CPG_ETHERSCAN_API_KEY");
        let bscscan_api_key = read_key("CPG_BSCSCAN_API_KEY");
        let trongrid_api_key = read_key("CPG_TRONGRID_API_KEY");
        Self {
            esplora_url,
            etherscan_url,
            etherscan_api_key,
            bscscan_url,
            bscscan_api_key,
            trongrid_url,
            trongrid_api_key,
        }
    }
}

fn read_key(var: &str) -> Option<Secret<String>> {
    match env::var(var) {
        Ok(key) if !key.trim().is_empty() => Some(Secret::new(key)),
        _ => {
            info!("🪛️ {var} is not set. Explorer queries will run unauthenticated at a reduced rate limit.");
            None
        },
    }
}
