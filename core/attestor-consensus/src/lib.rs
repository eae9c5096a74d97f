//! Attestor Consensus Module
//!
//! Bit-vote consensus for attestation rounds: given the bitmasks submitted
//! by the default-set voters, computes the canonical validity bitmask the
//! round commits to, degrading the required agreement size down to a
//! majority floor when the preferred consensus subset cannot agree.

pub mod bitvote;
pub mod subsets;

// Re-export main types for public API
pub use bitvote::{bit_voting_result, BitVoteOutcome};
pub use subsets::choose_candidate;
