//! Chain connection contract
//!
//! Submissions are fire-and-forget from the round's perspective: a missing
//! receipt marks the round as errored but never blocks phase progression.
//! Transport retries and gas management live behind this trait.

use crate::errors::RoundResult;
use async_trait::async_trait;
use attestor_core::Hash32;
use serde::{Deserialize, Serialize};

/// Receipt of an accepted on-chain submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    /// Transaction hash of the submission
    pub transaction_hash: String,

    /// Block the submission was included in
    pub block_number: u64,
}

/// Connection to the attestation protocol contracts
#[async_trait]
pub trait ChainConnection: Send + Sync {
    /// The account this provider submits from; bound into the masked
    /// commitment
    fn submitter_address(&self) -> String;

    /// Resolves the default voter set assigned by the given assigner
    /// addresses
    async fn get_attestor_addresses(&self, assigners: &[String]) -> RoundResult<Vec<String>>;

    /// Submits a commit for `buffer_number` together with the reveal of the
    /// round two epochs back. Returns `None` when no receipt came back.
    #[allow(clippy::too_many_arguments)]
    async fn submit_attestation(
        &self,
        action: &str,
        buffer_number: u64,
        merkle_root: Hash32,
        masked_merkle_root: Hash32,
        random: Hash32,
        reveal_merkle_root: Hash32,
        reveal_random: Hash32,
    ) -> Option<SubmissionReceipt>;

    /// Submits this provider's bit vote for `buffer_number`. The payload is
    /// the round-check byte followed by the hex bitmask.
    async fn submit_bit_vote(
        &self,
        action: &str,
        buffer_number: u64,
        payload: String,
        attestation_count: usize,
        validated_count: usize,
        duplicate_count: u64,
    ) -> Option<SubmissionReceipt>;
}
