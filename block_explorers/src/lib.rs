//! Read-only block-explorer clients for the four supported networks, and the chain-verification
//! logic built on top of them.
//!
//! Each client queries a public block-explorer-style API for recent transfers touching a wallet
//! address and answers one question: has a qualifying transfer of at least the expected amount
//! reached the network's required confirmation depth? The clients never sign, never hold keys and
//! never mutate anything upstream.
mod config;
mod data_objects;
mod error;
mod esplora;
mod etherscan;
mod helpers;
mod tron;
mod verifiers;

pub use config::ExplorerConfig;
pub use data_objects::{ChainTransaction, VerifyOutcome};
pub use error::ExplorerApiError;
pub use esplora::EsploraApi;
pub use etherscan::EtherscanFamilyApi;
pub use helpers::{parse_base_units, usdt_contract};
pub use tron::TrongridApi;
pub use verifiers::ChainVerifiers;
