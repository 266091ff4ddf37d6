//! Identifier generation.
use chrono::{DateTime, Utc};
use rand::Rng;

use crate::record_types::RecordId;

const HEX: &[u8; 16] = b"0123456789abcdef";

fn random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| HEX[rng.gen_range(0..16)] as char).collect()
}

/// Invoice ids for the manual route, which has no upstream to assign one.
pub fn manual_invoice_id() -> String {
    format!("manual_{}", random_hex(8))
}

pub fn new_record_id() -> RecordId {
    RecordId(format!("pay_{}", random_hex(16)))
}

/// The synthetic transaction reference recorded when an admin force-confirms without naming one.
pub fn admin_override_txid(now: DateTime<Utc>) -> String {
    format!("admin_override_{}", now.format("%Y%m%d_%H%M%S"))
}
