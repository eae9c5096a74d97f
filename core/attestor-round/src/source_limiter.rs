//! Per-source admission control for claim validation
//!
//! Each validation source gets a fixed request budget per round. Once the
//! budget is consumed, further claims from that source are recorded as
//! processed without ever reaching the verifier, so they can never be
//! counted as valid in this round.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Admission limits for one validation source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceLimiterConfig {
    /// Maximum number of validations admitted per round
    pub max_requests_per_round: u32,
}

impl Default for SourceLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests_per_round: 100,
        }
    }
}

/// Admission gate for a single source, valid for one round
#[derive(Debug)]
pub struct SourceLimiter {
    config: SourceLimiterConfig,

    /// Validations admitted so far
    admitted: u32,

    /// Claims turned away after the budget ran out
    rejected: u32,
}

impl SourceLimiter {
    /// Creates a limiter with a fresh budget
    pub fn new(config: SourceLimiterConfig) -> Self {
        Self {
            config,
            admitted: 0,
            rejected: 0,
        }
    }

    /// Admission check; consumes one budget token on success
    pub fn can_proceed(&mut self) -> bool {
        if self.admitted < self.config.max_requests_per_round {
            self.admitted += 1;
            true
        } else {
            self.rejected += 1;
            false
        }
    }

    /// Validations admitted so far
    pub fn admitted(&self) -> u32 {
        self.admitted
    }

    /// Claims rejected so far
    pub fn rejected(&self) -> u32 {
        self.rejected
    }
}

/// Fixed per-round limiter registry, populated from configuration at round
/// initialization. Sources without a configured limit are not validated.
#[derive(Debug)]
pub struct SourceLimiterRegistry {
    limiters: HashMap<u32, SourceLimiter>,
}

impl SourceLimiterRegistry {
    /// Builds the registry from the configured per-source limits
    pub fn from_config(limits: &HashMap<u32, SourceLimiterConfig>) -> Self {
        let limiters = limits
            .iter()
            .map(|(&source_id, config)| (source_id, SourceLimiter::new(config.clone())))
            .collect();
        Self { limiters }
    }

    /// Admission check for `source_id`; a source with no configured limiter
    /// is never admitted
    pub fn can_proceed(&mut self, source_id: u32) -> bool {
        match self.limiters.get_mut(&source_id) {
            Some(limiter) => limiter.can_proceed(),
            None => {
                debug!("No limiter configured for source {}, skipping validation", source_id);
                false
            }
        }
    }

    /// The limiter for `source_id`, if configured
    pub fn limiter(&self, source_id: u32) -> Option<&SourceLimiter> {
        self.limiters.get(&source_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_is_consumed() {
        let mut limiter = SourceLimiter::new(SourceLimiterConfig {
            max_requests_per_round: 2,
        });
        assert!(limiter.can_proceed());
        assert!(limiter.can_proceed());
        assert!(!limiter.can_proceed());
        assert!(!limiter.can_proceed());
        assert_eq!(limiter.admitted(), 2);
        assert_eq!(limiter.rejected(), 2);
    }

    #[test]
    fn test_unknown_source_is_rejected() {
        let mut limits = HashMap::new();
        limits.insert(1u32, SourceLimiterConfig { max_requests_per_round: 1 });
        let mut registry = SourceLimiterRegistry::from_config(&limits);

        assert!(registry.can_proceed(1));
        assert!(!registry.can_proceed(2));
        assert_eq!(registry.limiter(1).unwrap().admitted(), 1);
        assert!(registry.limiter(2).is_none());
    }
}
