//! Attestation request and validation outcome types

use attestor_core::hash::{keccak256, prefix_0x};
use attestor_core::Hash32;
use serde::{Deserialize, Serialize};

/// Validation status of a single attestation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttestationStatus {
    /// Waiting for validation to start
    Queued,
    /// Validation dispatched to the verifier
    Processing,
    /// Verifier confirmed the request
    Valid,
    /// Verifier rejected the request
    Invalid,
    /// Validation could not complete (malformed request, verifier failure)
    Failed,
    /// The request's source is not serviced by this provider
    Disabled,
}

impl AttestationStatus {
    /// True for statuses that can still become `Valid` through validation
    pub fn is_pending(self) -> bool {
        matches!(self, AttestationStatus::Queued | AttestationStatus::Processing)
    }
}

/// Immutable attestation request payload, as read from the request event feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationData {
    /// Identifier of the external chain the claim is about
    pub source_id: u32,

    /// Raw request bytes, hex encoded
    pub request: String,

    /// Block the request event was emitted in
    pub block_number: u64,

    /// Log position of the request event inside the block
    pub log_index: u32,
}

impl AttestationData {
    /// Canonical request id used for de-duplication. The block position is
    /// deliberately excluded so resubmissions of the same request collapse
    /// onto one attestation.
    pub fn id(&self) -> String {
        let digest = keccak256(self.request.to_lowercase().as_bytes());
        prefix_0x(&hex::encode(digest))
    }
}

/// Verifier output for a validated attestation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationData {
    /// Verifier-specific status string
    pub status: String,

    /// Hash of the attestation response, the Merkle tree leaf
    pub hash: Hash32,

    /// Parsed request payload, serialized for the audit log
    pub request: String,

    /// Response payload, serialized for the audit log
    pub response: String,
}

/// Outcome reported back by the validator once a request finishes processing
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    /// Terminal attestation status, one of `Valid`, `Invalid`, `Failed`
    pub status: AttestationStatus,

    /// Verification payload, present when the verifier produced a response
    pub verification: Option<VerificationData>,
}

/// A single attestation inside a round: the request plus its mutable
/// validation state
#[derive(Debug, Clone)]
pub struct Attestation {
    /// Round the attestation was collected in
    pub round_id: u64,

    /// Request payload
    pub data: AttestationData,

    /// Current validation status
    pub status: AttestationStatus,

    /// Whether the bit-vote result selected this attestation
    pub chosen: bool,

    /// Position inside the round, assigned once at insertion
    pub index: usize,

    /// Verifier output, set when validation completes
    pub verification: Option<VerificationData>,
}

impl Attestation {
    /// Creates a queued attestation for `round_id`
    pub fn new(round_id: u64, data: AttestationData) -> Self {
        Self {
            round_id,
            data,
            status: AttestationStatus::Queued,
            chosen: false,
            index: 0,
            verification: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(request: &str) -> AttestationData {
        AttestationData {
            source_id: 1,
            request: request.to_string(),
            block_number: 100,
            log_index: 0,
        }
    }

    #[test]
    fn test_id_ignores_block_position() {
        let mut first = data("0xdeadbeef");
        first.block_number = 100;
        let mut second = data("0xdeadbeef");
        second.block_number = 200;
        second.log_index = 7;
        assert_eq!(first.id(), second.id());
    }

    #[test]
    fn test_id_is_case_insensitive() {
        assert_eq!(data("0xDEADBEEF").id(), data("0xdeadbeef").id());
        assert_ne!(data("0xdeadbeef").id(), data("0xdeadbe00").id());
    }

    #[test]
    fn test_pending_statuses() {
        assert!(AttestationStatus::Queued.is_pending());
        assert!(AttestationStatus::Processing.is_pending());
        assert!(!AttestationStatus::Valid.is_pending());
        assert!(!AttestationStatus::Invalid.is_pending());
    }
}
