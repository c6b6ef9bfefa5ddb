// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Cross-request state for the stateful services.
//!
//! Circuit breakers and anomaly models keep their state here, keyed by a context
//! name the route author picks. Rate limiters are keyed by their normalized limit
//! and hold per-token logs inside. One [`SharedState`] is created at
//! startup and handed to every gateway through `Collaborators`, so tests can run
//! against an isolated instance with a manual clock and a fixed random seed.

mod clock;
mod table;

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Instant;

use crate::backends::anomaly::AnomalyState;
use crate::backends::circuit_breaker::BreakerState;
use crate::backends::rate_limiter::SlidingWindowLimiter;

pub use clock::{Clock, ManualClock, SystemClock};
pub use table::KeyedTable;

pub type BreakerTable = KeyedTable<BreakerState>;
pub type LimiterTable = KeyedTable<SlidingWindowLimiter>;
pub type AnomalyTable = KeyedTable<AnomalyState>;

pub struct SharedState {
    clock: Arc<dyn Clock>,
    rng_seed: Option<u64>,
    pub breakers: BreakerTable,
    pub limiters: LimiterTable,
    pub anomaly: AnomalyTable,
}

impl SharedState {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            rng_seed: None,
            breakers: KeyedTable::new(),
            limiters: KeyedTable::new(),
            anomaly: KeyedTable::new(),
        }
    }

    /// Make every random draw reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// A random source for a new context: seeded when a seed was given, otherwise
    /// from OS entropy.
    pub fn new_rng(&self) -> StdRng {
        match self.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Drop the breaker and anomaly state of one context.
    pub fn evict(&self, context: &str) {
        self.breakers.evict(context);
        self.anomaly.evict(context);
    }

    /// Drop one caller token from every rate limiter.
    pub fn evict_token(&self, token: &str) -> usize {
        self.limiters
            .values()
            .iter()
            .filter(|limiter| limiter.write().evict_token(token))
            .count()
    }

    /// Drop idle tokens from every rate limiter. Returns how many went.
    pub fn prune_limiters(&self) -> usize {
        let now = self.now();
        self.limiters
            .values()
            .iter()
            .map(|limiter| limiter.write().prune(now))
            .sum()
    }

    /// Drop all state.
    pub fn reset(&self) {
        self.breakers.clear();
        self.limiters.clear();
        self.anomaly.clear();
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl std::fmt::Debug for SharedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedState")
            .field("rng_seed", &self.rng_seed)
            .field("breakers", &self.breakers.len())
            .field("limiters", &self.limiters.len())
            .field("anomaly", &self.anomaly.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::rate_limiter::Rate;
    use std::time::Duration;

    #[test]
    fn test_evict_leaves_limiters_alone() {
        let clock = Arc::new(ManualClock::new());
        let state = SharedState::new(clock.clone());
        let limiter = state
            .limiters
            .get_or_insert_with("2-S", || SlidingWindowLimiter::new(Rate::parse("2-S").unwrap()));
        limiter.write().consume("client-1", clock.now());
        limiter.write().consume("client-2", clock.now());

        state.evict("client-1");
        assert_eq!(state.limiters.len(), 1);
        assert_eq!(limiter.read().tokens(), 2);

        assert_eq!(state.evict_token("client-1"), 1);
        assert_eq!(limiter.read().tokens(), 1);

        clock.advance(Duration::from_secs(1));
        assert_eq!(state.prune_limiters(), 1);
        assert_eq!(limiter.read().tokens(), 0);
    }
}
