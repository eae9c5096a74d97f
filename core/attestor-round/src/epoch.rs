//! Epoch timing for attestation rounds
//!
//! Rounds are fixed time windows laid out back to back. The engine never
//! sleeps on these boundaries itself; the external scheduler reads them and
//! drives the phase transitions.

use serde::{Deserialize, Serialize};

/// Wall-clock layout of the round windows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochSettings {
    /// Start of round 0, milliseconds since the unix epoch
    pub first_epoch_start_ms: u64,

    /// Length of one round window in milliseconds
    pub epoch_period_ms: u64,

    /// Length of the choose (bit-vote) window in milliseconds
    pub choose_window_ms: u64,
}

impl EpochSettings {
    /// Creates the epoch layout
    pub fn new(first_epoch_start_ms: u64, epoch_period_ms: u64, choose_window_ms: u64) -> Self {
        Self {
            first_epoch_start_ms,
            epoch_period_ms,
            choose_window_ms,
        }
    }

    /// Start of the collect phase of `round_id`
    pub fn round_start_time_ms(&self, round_id: u64) -> u64 {
        self.first_epoch_start_ms + round_id * self.epoch_period_ms
    }

    /// Start of the choose phase: one full window after round start
    pub fn choose_start_time_ms(&self, round_id: u64) -> u64 {
        self.round_start_time_ms(round_id) + self.epoch_period_ms
    }

    /// Start of the commit phase: choose start plus the choose window
    pub fn commit_start_time_ms(&self, round_id: u64) -> u64 {
        self.choose_start_time_ms(round_id) + self.choose_window_ms
    }

    /// Bit voting is force closed this long after the commit phase begins
    pub fn force_close_bit_voting_time_ms(&self, round_id: u64, offset_ms: u64) -> u64 {
        self.commit_start_time_ms(round_id) + offset_ms
    }

    /// Start of the reveal phase: one full window after the choose start
    pub fn reveal_start_time_ms(&self, round_id: u64) -> u64 {
        self.choose_start_time_ms(round_id) + self.epoch_period_ms
    }

    /// End of the round: one full window after the reveal start
    pub fn round_complete_time_ms(&self, round_id: u64) -> u64 {
        self.reveal_start_time_ms(round_id) + self.epoch_period_ms
    }

    /// The round whose collect window covers `time_ms`
    pub fn round_id_for_time(&self, time_ms: u64) -> u64 {
        time_ms.saturating_sub(self.first_epoch_start_ms) / self.epoch_period_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_layout() {
        let epochs = EpochSettings::new(1000, 90_000, 30_000);
        assert_eq!(epochs.round_start_time_ms(0), 1000);
        assert_eq!(epochs.round_start_time_ms(2), 181_000);
        assert_eq!(epochs.choose_start_time_ms(0), 91_000);
        assert_eq!(epochs.commit_start_time_ms(0), 121_000);
        assert_eq!(epochs.force_close_bit_voting_time_ms(0, 2000), 123_000);
        assert_eq!(epochs.reveal_start_time_ms(0), 181_000);
        assert_eq!(epochs.round_complete_time_ms(0), 271_000);
    }

    #[test]
    fn test_round_id_for_time() {
        let epochs = EpochSettings::new(1000, 90_000, 30_000);
        assert_eq!(epochs.round_id_for_time(1000), 0);
        assert_eq!(epochs.round_id_for_time(90_999), 0);
        assert_eq!(epochs.round_id_for_time(91_000), 1);
        // clamp before the first epoch
        assert_eq!(epochs.round_id_for_time(0), 0);
    }

    #[test]
    fn test_reveal_overlaps_next_collect() {
        // round N reveals while round N+2 collects
        let epochs = EpochSettings::new(0, 90_000, 30_000);
        assert_eq!(epochs.reveal_start_time_ms(0), epochs.round_start_time_ms(2));
    }
}
