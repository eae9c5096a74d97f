//! Validator contract
//!
//! Chain-specific verification lives behind this trait. The round dispatches
//! admitted requests here and feeds the outcome back through its processed
//! path; the verifier never touches round state directly.

use crate::attestation::{AttestationData, VerificationOutcome};
use async_trait::async_trait;

/// Asynchronous attestation verifier
#[async_trait]
pub trait AttestationValidator: Send + Sync {
    /// Validates one attestation request. The returned status must be one of
    /// `Valid`, `Invalid` or `Failed`.
    async fn validate(&self, data: AttestationData) -> VerificationOutcome;
}
