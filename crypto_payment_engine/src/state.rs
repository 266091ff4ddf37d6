//! The payment lifecycle state machine.
//!
//! [`evaluate`] is pure and synchronous: it looks at the current record and one fresh
//! observation, and decides what — if anything — may change. All mutation happens elsewhere,
//! under the store's version check, so two concurrent status checks cannot both apply the same
//! transition.
use cpg_common::PaymentStatus;
use log::*;

use crate::{
    record_types::{ObservationRefresh, PaymentRecord, StatusTransition},
    traits::StatusObservation,
};

/// The outcome of evaluating one observation against a record.
#[derive(Debug, Clone)]
pub enum Decision {
    /// Apply a state transition and append it to the history.
    Apply(StatusTransition),
    /// Same status as before: update the volatile fields only. No history entry.
    Refresh(ObservationRefresh),
    /// Nothing to do; the observation carries no new information.
    Ignore(&'static str),
    /// The observation conflicts with an invariant. It is logged and audited, never applied.
    Anomaly(String),
}

/// Statuses that credit the payment to a transaction, and therefore require one.
fn credits_transaction(status: PaymentStatus) -> bool {
    matches!(status, PaymentStatus::Confirming | PaymentStatus::Confirmed | PaymentStatus::Completed)
}

pub fn evaluate(record: &PaymentRecord, observation: &StatusObservation) -> Decision {
    let current = record.status;
    let observed = observation.status;

    // Terminal states are never left. Anything that disagrees is an anomaly, not a transition.
    if current.is_terminal() {
        if observed == current {
            return Decision::Ignore("terminal state re-reported");
        }
        return Decision::Anomaly(format!(
            "observation '{observed}' from {} conflicts with terminal state '{current}' on invoice {}",
            observation.source, record.invoice_id
        ));
    }

    // Idempotent attribution: once credited to a transaction, the record stays credited to it.
    if let (Some(existing), Some(attempted)) = (record.transaction_id.as_deref(), observation.transaction_id.as_deref())
    {
        if existing != attempted && credits_transaction(observed) {
            return Decision::Anomaly(format!(
                "invoice {} is credited to transaction {existing}; observation from {} names {attempted}",
                record.invoice_id, observation.source
            ));
        }
    }

    // Entering a crediting state without any transaction reference is a verification gap.
    if credits_transaction(observed) &&
        observed != current &&
        observation.transaction_id.is_none() &&
        record.transaction_id.is_none()
    {
        return Decision::Anomaly(format!(
            "observation '{observed}' from {} carries no transaction id for invoice {}",
            observation.source, record.invoice_id
        ));
    }

    if observed == current {
        return Decision::Refresh(ObservationRefresh {
            amount_paid: observation.amount_paid,
            confirmations: observation.confirmations,
            timestamp: chrono::Utc::now(),
        });
    }

    // A lower happy-path rank means the upstream is behind us, not that the payment regressed.
    if let (Some(current_rank), Some(observed_rank)) = (current.rank(), observed.rank()) {
        if observed_rank < current_rank {
            trace!(
                "💰️ Ignoring stale status '{observed}' for invoice {} (currently '{current}')",
                record.invoice_id
            );
            return Decision::Ignore("stale upstream status");
        }
    }

    let mut transition = StatusTransition::new(observed, observation.source.clone());
    // Only crediting states attribute the payment to a transaction; a partial payment must not
    // pin the record to the undersized transfer.
    if credits_transaction(observed) {
        if let Some(txid) = observation.transaction_id.clone().or_else(|| record.transaction_id.clone()) {
            transition = transition.with_transaction_id(txid);
        }
    }
    if let Some(amount) = observation.amount_paid {
        transition = transition.with_amount_paid(amount);
    }
    if let Some(confirmations) = observation.confirmations {
        transition = transition.with_confirmations(confirmations);
    }
    Decision::Apply(transition)
}

#[cfg(test)]
mod test {
    use cpg_common::{CryptoCurrency, Money, Network, PaymentProvider, PaymentStatus};
    use rand::{seq::SliceRandom, Rng, SeedableRng};

    use super::*;
    use crate::record_types::{OrderId, RecordId, StatusEntry, StatusSource};

    fn record_with_status(status: PaymentStatus) -> PaymentRecord {
        let now = chrono::Utc::now();
        PaymentRecord {
            id: RecordId("pay_test".to_string()),
            order_id: OrderId::from("order-1"),
            invoice_id: "inv-1".to_string(),
            provider: PaymentProvider::Manual,
            currency: CryptoCurrency::UsdtTrc20,
            expected_amount: Money::from(50),
            address: "TWallet".to_string(),
            status,
            transaction_id: None,
            amount_paid: None,
            confirmations: None,
            payment_url: None,
            description: None,
            instructions: None,
            created_at: now,
            updated_at: now,
            expires_at: None,
            status_history: vec![StatusEntry {
                status: PaymentStatus::Pending,
                timestamp: now,
                source: StatusSource::Provider(PaymentProvider::Manual),
            }],
            version: 1,
        }
    }

    fn observation(status: PaymentStatus, txid: Option<&str>) -> StatusObservation {
        StatusObservation {
            status,
            transaction_id: txid.map(String::from),
            amount_paid: None,
            confirmations: None,
            source: StatusSource::ChainScan(Network::Tron),
        }
    }

    /// Mirror of the store's apply step, for driving the pure state machine in tests.
    fn apply(record: &mut PaymentRecord, decision: Decision) {
        match decision {
            Decision::Apply(t) => {
                record.status = t.new_status;
                if record.transaction_id.is_none() {
                    record.transaction_id = t.transaction_id;
                }
                record.status_history.push(StatusEntry {
                    status: t.new_status,
                    timestamp: t.timestamp,
                    source: t.source,
                });
                record.version += 1;
            },
            Decision::Refresh(r) => {
                record.amount_paid = r.amount_paid.or(record.amount_paid);
                record.confirmations = r.confirmations.or(record.confirmations);
                record.version += 1;
            },
            Decision::Ignore(_) | Decision::Anomaly(_) => {},
        }
    }

    #[test]
    fn forward_moves_apply() {
        let record = record_with_status(PaymentStatus::Pending);
        let decision = evaluate(&record, &observation(PaymentStatus::Confirming, Some("tx-1")));
        assert!(matches!(decision, Decision::Apply(ref t) if t.new_status == PaymentStatus::Confirming));
    }

    #[test]
    fn pending_may_jump_straight_to_completed() {
        let record = record_with_status(PaymentStatus::Pending);
        let decision = evaluate(&record, &observation(PaymentStatus::Completed, Some("tx-1")));
        match decision {
            Decision::Apply(t) => {
                assert_eq!(t.new_status, PaymentStatus::Completed);
                assert_eq!(t.transaction_id.as_deref(), Some("tx-1"));
            },
            other => panic!("expected Apply, got {other:?}"),
        }
    }

    #[test]
    fn same_status_refreshes_without_history() {
        let record = record_with_status(PaymentStatus::Confirming);
        let decision = evaluate(&record, &observation(PaymentStatus::Confirming, Some("tx-1")));
        assert!(matches!(decision, Decision::Refresh(_)));
    }

    #[test]
    fn stale_upstream_status_is_ignored() {
        let record = record_with_status(PaymentStatus::Confirming);
        let decision = evaluate(&record, &observation(PaymentStatus::Pending, None));
        assert!(matches!(decision, Decision::Ignore(_)));
    }

    #[test]
    fn crediting_transition_without_transaction_id_is_rejected() {
        let record = record_with_status(PaymentStatus::Pending);
        for status in [PaymentStatus::Confirming, PaymentStatus::Confirmed, PaymentStatus::Completed] {
            let decision = evaluate(&record, &observation(status, None));
            assert!(matches!(decision, Decision::Anomaly(_)), "'{status}' without a txid must be rejected");
        }
    }

    #[test]
    fn crediting_transition_may_inherit_the_recorded_transaction_id() {
        let mut record = record_with_status(PaymentStatus::Confirming);
        record.transaction_id = Some("tx-1".to_string());
        let decision = evaluate(&record, &observation(PaymentStatus::Completed, None));
        match decision {
            Decision::Apply(t) => assert_eq!(t.transaction_id.as_deref(), Some("tx-1")),
            other => panic!("expected Apply, got {other:?}"),
        }
    }

    #[test]
    fn transaction_id_reassignment_is_an_anomaly() {
        let mut record = record_with_status(PaymentStatus::Confirming);
        record.transaction_id = Some("tx-1".to_string());
        let decision = evaluate(&record, &observation(PaymentStatus::Completed, Some("tx-2")));
        assert!(matches!(decision, Decision::Anomaly(_)));
    }

    #[test]
    fn partial_does_not_pin_the_transaction_id() {
        let record = record_with_status(PaymentStatus::Pending);
        let mut obs = observation(PaymentStatus::Partial, Some("small-tx"));
        obs.amount_paid = Some(Money::from(20));
        match evaluate(&record, &obs) {
            Decision::Apply(t) => {
                assert_eq!(t.new_status, PaymentStatus::Partial);
                assert!(t.transaction_id.is_none(), "a partial payment must not claim the record's txid slot");
            },
            other => panic!("expected Apply, got {other:?}"),
        }
    }

    #[test]
    fn terminal_states_reject_conflicting_observations() {
        for terminal in
            [PaymentStatus::Completed, PaymentStatus::Failed, PaymentStatus::Expired, PaymentStatus::Cancelled]
        {
            let record = record_with_status(terminal);
            let decision = evaluate(&record, &observation(PaymentStatus::Pending, None));
            assert!(matches!(decision, Decision::Anomaly(_)), "leaving '{terminal}' must be an anomaly");
            let decision = evaluate(&record, &observation(terminal, None));
            assert!(matches!(decision, Decision::Ignore(_)));
        }
    }

    #[test]
    fn no_observation_sequence_ever_exits_a_terminal_state() {
        let _ = env_logger::try_init();
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
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
        for _ in 0..500 {
            let mut record = record_with_status(PaymentStatus::Pending);
            let mut terminal_reached: Option<PaymentStatus> = None;
            for _ in 0..30 {
                let status = *all.choose(&mut rng).unwrap();
                let txid = if rng.gen_bool(0.7) { Some("tx-random") } else { None };
                let decision = evaluate(&record, &observation(status, txid));
                apply(&mut record, decision);
                if let Some(terminal) = terminal_reached {
                    assert_eq!(record.status, terminal, "terminal state '{terminal}' was exited");
                } else if record.status.is_terminal() {
                    terminal_reached = Some(record.status);
                }
            }
        }
    }
}
