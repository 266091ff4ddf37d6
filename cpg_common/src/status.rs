use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

//--------------------------------------    PaymentStatus     --------------------------------------------------------
/// The canonical, provider-independent payment lifecycle.
///
/// The happy path runs `Pending → Confirming → Confirmed → Completed`. The side branches are
/// `Partial` (received less than expected), `Unknown` (an upstream reply we refuse to guess at,
/// flagged for manual review), and the terminal failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Confirming,
    Confirmed,
    Completed,
    Partial,
    Failed,
    Refunded,
    Expired,
    Cancelled,
    Unknown,
}

impl PaymentStatus {
    /// Terminal states are never left once entered. A later observation conflicting with a
    /// terminal state is an anomaly, not a transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed |
                PaymentStatus::Failed |
                PaymentStatus::Refunded |
                PaymentStatus::Expired |
                PaymentStatus::Cancelled
        )
    }

    /// Position on the happy path, if this status is on it. Used to reject regressions
    /// (an upstream that reports `pending` after we recorded `confirming` is stale, not
    /// ground truth).
    pub fn rank(&self) -> Option<u8> {
        match self {
            PaymentStatus::Pending => Some(0),
            PaymentStatus::Confirming => Some(1),
            PaymentStatus::Confirmed => Some(2),
            PaymentStatus::Completed => Some(3),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Confirming => "confirming",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Expired => "expired",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Unknown => "unknown",
        }
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid payment status: {0}")]
pub struct StatusParseError(pub String);

impl FromStr for PaymentStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirming" => Ok(Self::Confirming),
            "confirmed" => Ok(Self::Confirmed),
            "completed" => Ok(Self::Completed),
            "partial" => Ok(Self::Partial),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            "expired" => Ok(Self::Expired),
            "cancelled" => Ok(Self::Cancelled),
            "unknown" => Ok(Self::Unknown),
            other => Err(StatusParseError(other.to_string())),
        }
    }
}

//--------------------------------------   PaymentProvider    --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    NowPayments,
    BtcPay,
    Manual,
}

impl Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentProvider::NowPayments => write!(f, "nowpayments"),
            PaymentProvider::BtcPay => write!(f, "btcpay"),
            PaymentProvider::Manual => write!(f, "manual"),
        }
    }
}

impl FromStr for PaymentProvider {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nowpayments" => Ok(Self::NowPayments),
            "btcpay" => Ok(Self::BtcPay),
            "manual" => Ok(Self::Manual),
            other => Err(StatusParseError(format!("not a payment provider: {other}"))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn terminal_set_is_exactly_the_five_terminal_states() {
        let terminal = [
            PaymentStatus::Completed,
            PaymentStatus::Failed,
            PaymentStatus::Refunded,
            PaymentStatus::Expired,
            PaymentStatus::Cancelled,
        ];
        let live =
            [PaymentStatus::Pending, PaymentStatus::Confirming, PaymentStatus::Confirmed, PaymentStatus::Partial, PaymentStatus::Unknown];
        for s in terminal {
            assert!(s.is_terminal(), "{s} should be terminal");
        }
        for s in live {
            assert!(!s.is_terminal(), "{s} should not be terminal");
        }
    }

    #[test]
    fn happy_path_ranks_are_ordered() {
        assert!(PaymentStatus::Pending.rank() < PaymentStatus::Confirming.rank());
        assert!(PaymentStatus::Confirming.rank() < PaymentStatus::Confirmed.rank());
        assert!(PaymentStatus::Confirmed.rank() < PaymentStatus::Completed.rank());
        assert_eq!(PaymentStatus::Partial.rank(), None);
    }

    #[test]
    fn statuses_serialize_to_their_lowercase_wire_form() {
        assert_eq!(serde_json::to_string(&PaymentStatus::Confirming).unwrap(), "\"confirming\"");
        assert_eq!(serde_json::from_str::<PaymentStatus>("\"partial\"").unwrap(), PaymentStatus::Partial);
        assert_eq!(serde_json::to_string(&PaymentProvider::NowPayments).unwrap(), "\"nowpayments\"");
    }

    #[test]
    fn status_strings_round_trip() {
        let all = [
            PaymentStatus::Pending,
            PaymentStatus::Confirming,
            PaymentStatus::Confirmed,
            PaymentStatus::Completed,
            PaymentStatus::Partial,
            PaymentStatus::Failed,
            PaymentStatus::Refunded,
            PaymentStatus::Expired,
            PaymentStatus::Cancelled,
            PaymentStatus::Unknown,
        ];
        for status in all {
            assert_eq!(status.to_string().parse::<PaymentStatus>().unwrap(), status);
        }
    }
}
