use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

//--------------------------------------       Network       ---------------------------------------------------------
/// The blockchain networks the gateway can watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Bitcoin,
    Ethereum,
    Tron,
    Bsc,
}

impl Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Bitcoin => write!(f, "bitcoin"),
            Network::Ethereum => write!(f, "ethereum"),
            Network::Tron => write!(f, "tron"),
            Network::Bsc => write!(f, "bsc"),
        }
    }
}

//--------------------------------------    CryptoCurrency    --------------------------------------------------------
/// The payable currencies. The stablecoin variants name both the coin and the network carrying it,
/// since the same logical USDT uses a different decimal convention on each chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CryptoCurrency {
    #[serde(rename = "BTC")]
    Btc,
    #[serde(rename = "USDT_TRC20")]
    UsdtTrc20,
    #[serde(rename = "USDT_ERC20")]
    UsdtErc20,
    #[serde(rename = "USDT_BEP20")]
    UsdtBep20,
}

impl CryptoCurrency {
    pub const ALL: [CryptoCurrency; 4] =
        [CryptoCurrency::Btc, CryptoCurrency::UsdtTrc20, CryptoCurrency::UsdtErc20, CryptoCurrency::UsdtBep20];

    pub fn network(&self) -> Network {
        match self {
            CryptoCurrency::Btc => Network::Bitcoin,
            CryptoCurrency::UsdtTrc20 => Network::Tron,
            CryptoCurrency::UsdtErc20 => Network::Ethereum,
            CryptoCurrency::UsdtBep20 => Network::Bsc,
        }
    }

    /// The decimal exponent between base units and human units. Getting this wrong silently
    /// under- or over-credits a payment, so it is table-driven and covered by tests.
    pub fn decimals(&self) -> u32 {
        match self {
            CryptoCurrency::Btc => 8,
            CryptoCurrency::UsdtTrc20 => 6,
            CryptoCurrency::UsdtErc20 => 6,
            CryptoCurrency::UsdtBep20 => 18,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CryptoCurrency::Btc => "BTC",
            CryptoCurrency::UsdtTrc20 => "USDT_TRC20",
            CryptoCurrency::UsdtErc20 => "USDT_ERC20",
            CryptoCurrency::UsdtBep20 => "USDT_BEP20",
        }
    }
}

impl Display for CryptoCurrency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("Unsupported currency: {0}")]
pub struct CurrencyParseError(pub String);

impl FromStr for CryptoCurrency {
    type Err = CurrencyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BTC" => Ok(Self::Btc),
            "USDT_TRC20" => Ok(Self::UsdtTrc20),
            "USDT_ERC20" => Ok(Self::UsdtErc20),
            "USDT_BEP20" => Ok(Self::UsdtBep20),
            other => Err(CurrencyParseError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decimal_exponents_match_network_conventions() {
        let expected = [
            (CryptoCurrency::Btc, Network::Bitcoin, 8),
            (CryptoCurrency::UsdtTrc20, Network::Tron, 6),
            (CryptoCurrency::UsdtErc20, Network::Ethereum, 6),
            (CryptoCurrency::UsdtBep20, Network::Bsc, 18),
        ];
        for (currency, network, decimals) in expected {
            assert_eq!(currency.network(), network);
            assert_eq!(currency.decimals(), decimals);
        }
    }

    #[test]
    fn parse_round_trips_and_is_case_insensitive() {
        for currency in CryptoCurrency::ALL {
            assert_eq!(currency.to_string().parse::<CryptoCurrency>().unwrap(), currency);
        }
        assert_eq!("usdt_trc20".parse::<CryptoCurrency>().unwrap(), CryptoCurrency::UsdtTrc20);
        assert!("DOGE".parse::<CryptoCurrency>().is_err());
    }
}
