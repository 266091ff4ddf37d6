use cpg_common::Money;
use serde::{Deserialize, Serialize};

//--------------------------------------   ChainTransaction   --------------------------------------------------------
/// A single observed transfer to a watched address, already scaled to human units.
///
/// These are ephemeral: produced by a chain scan and consumed once to decide a status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainTransaction {
    pub txid: String,
    pub to_address: String,
    pub amount: Money,
    pub confirmed: bool,
    pub confirmations: Option<u32>,
    pub block_height: Option<u64>,
}

//--------------------------------------     VerifyOutcome    --------------------------------------------------------
/// The result of scanning a wallet address for an expected payment.
#[derive(Debug, Clone)]
pub enum VerifyOutcome {
    /// A transfer of at least the expected amount that satisfies the network's confirmation
    /// predicate. The payment is verified.
    Qualified(ChainTransaction),
    /// A transfer of at least the expected amount that has not yet reached confirmation depth.
    AwaitingConfirmation(ChainTransaction),
    /// A confirmed incoming transfer below the expected amount. Partial payments are never
    /// aggregated across transactions.
    Short(ChainTransaction),
    /// No incoming transfer was found. This is not a failure; the caller retries later.
    NotFound,
}

impl VerifyOutcome {
    pub fn transaction(&self) -> Option<&ChainTransaction> {
        match self {
            VerifyOutcome::Qualified(tx) |
            VerifyOutcome::AwaitingConfirmation(tx) |
            VerifyOutcome::Short(tx) => Some(tx),
            VerifyOutcome::NotFound => None,
        }
    }

    pub fn is_qualified(&self) -> bool {
        matches!(self, VerifyOutcome::Qualified(_))
    }
}
