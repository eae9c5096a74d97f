//! Round state store contract
//!
//! Durable storage is delegated. The engine persists round commitments (the
//! reveal of round N is read back when committing round N+1 after a restart)
//! and appends per-attestation audit records; it never reads its own round
//! state back during normal operation.

use crate::errors::RoundResult;
use async_trait::async_trait;
use attestor_core::Hash32;
use serde::{Deserialize, Serialize};

/// Audit record of one attestation request and its validation outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationRequestRecord {
    /// Round the request was collected in
    pub round_id: u64,

    /// Block of the request event
    pub block_number: u64,

    /// Log position of the request event
    pub log_index: u32,

    /// Final attestation status
    pub attestation_status: String,

    /// Verifier-specific status, when validation produced one
    pub verification_status: Option<String>,

    /// Serialized request payload
    pub request: String,

    /// Serialized response payload
    pub response: String,

    /// Response hash, hex, when validation produced one
    pub hash: Option<String>,
}

/// Audit record of one attestation selected into the round's Merkle tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingRoundResultRecord {
    /// Round the result belongs to
    pub round_id: u64,

    /// Response hash, hex
    pub hash: String,

    /// Serialized request payload
    pub request: String,

    /// Serialized response payload
    pub response: String,
}

/// Persisted commitment material of a round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundSnapshot {
    /// Round id
    pub round_id: u64,

    /// Merkle root, hex
    pub merkle_root: String,

    /// Masked Merkle root, hex
    pub masked_merkle_root: String,

    /// Commit random, hex
    pub random: String,

    /// Number of attestations included in the tree
    pub valid_count: usize,

    /// Number of attestations collected in the round
    pub attestation_count: usize,

    /// Rejected duplicate submissions
    pub duplicate_count: u64,
}

/// Commitment material read back for the delayed reveal
#[derive(Debug, Clone)]
pub struct StoredCommitment {
    /// Merkle root of the stored round
    pub merkle_root: Hash32,

    /// Commit random of the stored round
    pub random: Hash32,
}

/// Durable store for round state and audit records
#[async_trait]
pub trait RoundStateStore: Send + Sync {
    /// Persists the round's commitment material
    async fn save_round(&self, snapshot: RoundSnapshot) -> RoundResult<()>;

    /// Persists the round's bit-vote result bitmask
    async fn save_bit_vote_result(&self, round_id: u64, bitmask: String) -> RoundResult<()>;

    /// Reads back the commitment of `round_id`, if one was stored
    async fn get_round(&self, round_id: u64) -> RoundResult<Option<StoredCommitment>>;

    /// Appends attestation request audit records
    async fn save_attestation_requests(&self, records: Vec<AttestationRequestRecord>) -> RoundResult<()>;

    /// Appends voting result audit records
    async fn save_voting_round_results(&self, records: Vec<VotingRoundResultRecord>) -> RoundResult<()>;
}
