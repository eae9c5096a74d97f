//! Configuration for the round lifecycle engine

use crate::source_limiter::SourceLimiterConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Network-wide attestation parameters, shared by all providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalAttestationConfig {
    /// Addresses of the assigning authority whose assignments form the
    /// default voter set; the majority floor for degraded consensus is
    /// derived from this list
    pub default_set_assigner_addresses: Vec<String>,

    /// Preferred number of agreeing voters for the bit-vote result
    pub consensus_subset_size: usize,

    /// Per-source admission limits, keyed by source id
    pub source_limits: HashMap<u32, SourceLimiterConfig>,
}

impl Default for GlobalAttestationConfig {
    fn default() -> Self {
        Self {
            default_set_assigner_addresses: Vec::new(),
            consensus_subset_size: 7,
            source_limits: HashMap::new(),
        }
    }
}

impl GlobalAttestationConfig {
    /// Majority floor of the assigner set, the absolute minimum number of
    /// agreeing voters for a conclusive bit-vote result
    pub fn min_voters(&self) -> usize {
        self.default_set_assigner_addresses.len().div_ceil(2)
    }
}

/// Provider-local client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationClientConfig {
    /// Label included in every round log line; "none" disables it
    pub label: String,

    /// Submit an all-zero commit after a cold start to finalize the round
    /// three epochs back
    pub submit_commit_finalize: bool,

    /// Offset after the commit phase start at which bit voting is force
    /// closed, in seconds
    pub force_close_bit_voting_sec: u64,
}

impl Default for AttestationClientConfig {
    fn default() -> Self {
        Self {
            label: "none".to_string(),
            submit_commit_finalize: false,
            force_close_bit_voting_sec: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_voters_is_majority_of_assigners() {
        let mut config = GlobalAttestationConfig::default();
        assert_eq!(config.min_voters(), 0);

        config.default_set_assigner_addresses = vec!["0xa1".into(); 9];
        assert_eq!(config.min_voters(), 5);

        config.default_set_assigner_addresses = vec!["0xa1".into(); 10];
        assert_eq!(config.min_voters(), 5);
    }
}
