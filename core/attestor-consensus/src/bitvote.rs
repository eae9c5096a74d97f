//! Bit-vote resolution for an attestation round
//!
//! The round collects one bitmask per default-set voter (missing votes count
//! as the empty vote) and resolves them into a single canonical bitmask.
//! Agreement is first attempted at the configured consensus subset size and
//! degrades one voter at a time down to the majority floor of the assigner
//! set.

use crate::subsets::choose_candidate;
use attestor_core::BitmaskAccumulator;
use tracing::{error, info};

/// Result of resolving the registered bit votes
#[derive(Debug, Clone)]
pub enum BitVoteOutcome {
    /// Too few voters or no agreeing subset; the round proceeds with an
    /// empty commitment
    Inconclusive,

    /// Some group of `adopted_size` voters agreed on this non-empty bitmask
    Candidate {
        bitmask: BitmaskAccumulator,
        adopted_size: usize,
    },

    /// The agreed bitmask references attestation indices beyond the local
    /// attestation count; the shared index space and the local view diverged
    /// and the round must not adopt the result
    IndexMismatch,
}

/// Resolves the bit votes of the default set.
///
/// `votes` holds one bitmask per default-set address, in address order, with
/// missing votes already substituted by the empty vote. `min_voters` is the
/// majority floor of the assigner set, `ceil(|assigners| / 2)`, computed by
/// the caller.
pub fn bit_voting_result(
    votes: &[BitmaskAccumulator],
    consensus_subset_size: usize,
    min_voters: usize,
    attestation_count: usize,
) -> BitVoteOutcome {
    let non_zero_votes = votes.iter().filter(|vote| vote.count_ones() > 0).count();
    if non_zero_votes < min_voters {
        info!(
            "Less than minimal number of voters voted {}, required >= {}",
            non_zero_votes, min_voters
        );
        return BitVoteOutcome::Inconclusive;
    }

    // find the first non-empty candidate on subset sizes
    // consensus_subset_size, ..., min_voters
    let mut adopted: Option<(BitmaskAccumulator, usize)> = None;
    let mut size = consensus_subset_size;
    while size >= min_voters {
        let candidate = choose_candidate(votes, size);
        if candidate.count_ones() > 0 {
            if size != consensus_subset_size {
                info!(
                    "Vote successful with lower consensus threshold {}/{}",
                    size, consensus_subset_size
                );
            }
            adopted = Some((candidate, size));
            break;
        }
        info!("Unsuccessful vote count for threshold {}/{}", size, votes.len());
        if size == 0 {
            break;
        }
        size -= 1;
    }

    let Some((bitmask, adopted_size)) = adopted else {
        info!(
            "Non-conclusive vote. Non zero voters: {}, required >= {}",
            non_zero_votes, min_voters
        );
        return BitVoteOutcome::Inconclusive;
    };

    if bitmask.has_active_bits_beyond(attestation_count) {
        error!("Local and all indices do not match. Critical error!");
        return BitVoteOutcome::IndexMismatch;
    }

    BitVoteOutcome::Candidate { bitmask, adopted_size }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn votes(hex: &[&str]) -> Vec<BitmaskAccumulator> {
        hex.iter().map(|vote| BitmaskAccumulator::from_hex(vote).unwrap()).collect()
    }

    #[test]
    fn test_degraded_threshold_adoption() {
        // 9 default-set addresses, 6 vote 0x07, the rest never vote
        let votes = votes(&[
            "0x07", "0x07", "0x07", "0x07", "0x07", "0x07", "0x00", "0x00", "0x00",
        ]);
        match bit_voting_result(&votes, 8, 5, 8) {
            BitVoteOutcome::Candidate { bitmask, adopted_size } => {
                assert_eq!(bitmask.to_hex(), "0x07");
                assert_eq!(adopted_size, 6);
            }
            other => panic!("expected candidate, got {other:?}"),
        }
    }

    #[test]
    fn test_quorum_gate() {
        // only 4 non-empty votes with a majority floor of 5
        let votes = votes(&[
            "0x07", "0x07", "0x07", "0x07", "0x00", "0x00", "0x00", "0x00", "0x00",
        ]);
        assert!(matches!(
            bit_voting_result(&votes, 8, 5, 8),
            BitVoteOutcome::Inconclusive
        ));
    }

    #[test]
    fn test_disagreeing_votes_are_inconclusive() {
        // enough voters but no pair shares a bit
        let votes = votes(&["0x80", "0x40", "0x20", "0x10"]);
        assert!(matches!(
            bit_voting_result(&votes, 3, 2, 8),
            BitVoteOutcome::Inconclusive
        ));
    }

    #[test]
    fn test_index_mismatch_is_critical() {
        // all voters agree on bits 5..8 but the local round only has 3 attestations
        let votes = votes(&["0x07", "0x07", "0x07"]);
        assert!(matches!(
            bit_voting_result(&votes, 3, 2, 3),
            BitVoteOutcome::IndexMismatch
        ));
    }

    #[test]
    fn test_full_consensus_size_adoption() {
        let votes = votes(&["0xe0", "0xe0", "0xe0", "0xe0"]);
        match bit_voting_result(&votes, 4, 2, 3) {
            BitVoteOutcome::Candidate { bitmask, adopted_size } => {
                assert_eq!(bitmask.to_hex(), "0xe0");
                assert_eq!(adopted_size, 4);
            }
            other => panic!("expected candidate, got {other:?}"),
        }
    }
}
