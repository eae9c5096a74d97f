//! Round registry
//!
//! Arena of live rounds keyed by round id. Neighboring rounds are resolved
//! by id through the registry instead of owned pointers, so the only
//! cross-round link (the delayed reveal) carries no lifetime coupling.
//! Completed rounds are pruned once they can no longer serve a reveal.

use crate::round::AttestationRound;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::warn;

/// Live rounds of this provider, keyed by round id
#[derive(Default)]
pub struct RoundRegistry {
    rounds: DashMap<u64, Arc<AttestationRound>>,
}

impl RoundRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a round under its id, replacing any previous instance
    pub fn register(&self, round: Arc<AttestationRound>) {
        self.rounds.insert(round.round_id(), round);
    }

    /// The round with the given id, if still live
    pub fn get(&self, round_id: u64) -> Option<Arc<AttestationRound>> {
        self.rounds.get(&round_id).map(|entry| entry.value().clone())
    }

    /// The logical successor of `round_id`
    pub fn next_round(&self, round_id: u64) -> Option<Arc<AttestationRound>> {
        self.get(round_id + 1)
    }

    /// The logical predecessor of `round_id`
    pub fn prev_round(&self, round_id: u64) -> Option<Arc<AttestationRound>> {
        round_id.checked_sub(1).and_then(|previous| self.get(previous))
    }

    /// Reveals `round_id`, wiring in the next round's commit data
    pub fn reveal_round(&self, round_id: u64) {
        match self.get(round_id) {
            Some(round) => round.reveal(self.next_round(round_id)),
            None => warn!("cannot reveal unknown round #{}", round_id),
        }
    }

    /// Drops every round older than `oldest_round_id`. A round is only
    /// needed until the preceding round's reveal has gone out.
    pub fn prune_before(&self, oldest_round_id: u64) {
        self.rounds.retain(|&round_id, _| round_id >= oldest_round_id);
    }

    /// Number of live rounds
    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    /// True when no rounds are live
    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }
}
