//! Metrics collection for the round lifecycle

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_int_counter, CounterVec, IntCounter};

lazy_static! {
    /// Counter for attestations entering rounds
    pub static ref ATTESTATIONS_ADDED: IntCounter = register_int_counter!(
        "attestor_attestations_added_total",
        "Total number of attestations admitted into rounds"
    ).unwrap();

    /// Counter for rejected duplicate submissions
    pub static ref ATTESTATION_DUPLICATES: IntCounter = register_int_counter!(
        "attestor_attestation_duplicates_total",
        "Total number of duplicate attestation submissions rejected"
    ).unwrap();

    /// Counter for registered peer bit votes
    pub static ref BIT_VOTES_REGISTERED: IntCounter = register_int_counter!(
        "attestor_bit_votes_registered_total",
        "Total number of default-set bit votes registered"
    ).unwrap();

    /// Counter for round submissions by kind and result
    pub static ref ROUND_SUBMISSIONS: CounterVec = register_counter_vec!(
        "attestor_round_submissions_total",
        "Total number of round submissions",
        &["kind", "result"]
    ).unwrap();
}

/// Record a commit/reveal/bit-vote submission outcome
pub fn record_submission(kind: &str, receipt_received: bool) {
    let result = if receipt_received { "ok" } else { "no_receipt" };
    ROUND_SUBMISSIONS.with_label_values(&[kind, result]).inc();
}
