//! Attestor Round Module
//!
//! Round lifecycle engine for the attestation provider: the phase/status
//! state machine, bit-vote consensus wiring, the commit-reveal scheme and
//! per-source admission control. Chain verification, transaction submission
//! and durable storage stay behind the collaborator traits.

pub mod attestation;
pub mod config;
pub mod connection;
pub mod epoch;
pub mod errors;
pub mod metrics;
pub mod registry;
pub mod round;
pub mod source_limiter;
pub mod store;
pub mod tasks;
pub mod validation;

// Re-export main types for public API
pub use attestation::{Attestation, AttestationData, AttestationStatus, VerificationData, VerificationOutcome};
pub use config::{AttestationClientConfig, GlobalAttestationConfig};
pub use connection::{ChainConnection, SubmissionReceipt};
pub use epoch::EpochSettings;
pub use errors::{RoundError, RoundResult};
pub use registry::RoundRegistry;
pub use round::{AttestationRound, BitVoteData, RoundPhase, RoundStatus};
pub use source_limiter::{SourceLimiter, SourceLimiterConfig, SourceLimiterRegistry};
pub use store::{
    AttestationRequestRecord, RoundSnapshot, RoundStateStore, StoredCommitment, VotingRoundResultRecord,
};
pub use validation::AttestationValidator;
