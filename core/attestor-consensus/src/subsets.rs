//! Deterministic subset candidate selection
//!
//! Given the vote bitmasks of the default set, `choose_candidate` finds the
//! intersection shared by some group of exactly `size` voters. The selection
//! rule is part of the protocol: every provider must arrive at the same
//! candidate for the same vote list, so the search order is fixed.
//!
//! Rule: enumerate index subsets of exactly `size` votes in lexicographic
//! order (vote order = default-set address order) and take the bitwise
//! intersection of each subset. The candidate is the intersection with the
//! largest population count; ties go to the subset enumerated first.

use attestor_core::BitmaskAccumulator;

/// Computes the canonical candidate bitmask for agreement groups of exactly
/// `size` voters. Returns the empty bitmask when `size` is zero, larger than
/// the vote list, or no group shares a set bit.
pub fn choose_candidate(votes: &[BitmaskAccumulator], size: usize) -> BitmaskAccumulator {
    if size == 0 || size > votes.len() {
        return BitmaskAccumulator::new(0);
    }

    let width = votes.iter().map(|vote| vote.as_bytes().len()).max().unwrap_or(0);
    let padded: Vec<Vec<u8>> = votes
        .iter()
        .map(|vote| {
            let mut bytes = vote.as_bytes().to_vec();
            bytes.resize(width, 0);
            bytes
        })
        .collect();

    let mut best: Option<Vec<u8>> = None;
    let running = vec![0xffu8; width];
    search(&padded, 0, size, running, &mut best);

    match best {
        Some(bytes) => BitmaskAccumulator::from_bytes(bytes),
        None => BitmaskAccumulator::new(0),
    }
}

/// Depth-first lexicographic walk over index subsets, carrying the running
/// intersection. Zero intersections are pruned: they cannot beat any
/// candidate with a set bit, and if nothing has a set bit the result is the
/// empty bitmask anyway.
fn search(votes: &[Vec<u8>], start: usize, remaining: usize, running: Vec<u8>, best: &mut Option<Vec<u8>>) {
    if remaining == 0 {
        let ones = count_ones(&running);
        if ones > 0 {
            let best_ones = best.as_deref().map(count_ones).unwrap_or(0);
            // strict comparison keeps the first subset found on ties
            if ones > best_ones {
                *best = Some(running);
            }
        }
        return;
    }

    // not enough votes left to complete a subset
    if votes.len() - start < remaining {
        return;
    }

    for index in start..=votes.len() - remaining {
        let mut intersection = running.clone();
        for (byte, vote_byte) in intersection.iter_mut().zip(&votes[index]) {
            *byte &= vote_byte;
        }
        if count_ones(&intersection) == 0 {
            continue;
        }
        search(votes, index + 1, remaining - 1, intersection, best);
    }
}

fn count_ones(bytes: &[u8]) -> u32 {
    bytes.iter().map(|byte| byte.count_ones()).sum()
}
