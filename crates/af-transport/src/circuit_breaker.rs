//! Per-agent circuit breaker (spec §4.6): after `N` consecutive failures,
//! short-circuit `send`/`status` for a cooldown window.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use af_core::{AgentId, Clock};
use parking_lot::Mutex;

use crate::error::TransportError;

struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl BreakerState {
    fn fresh() -> Self {
        Self { consecutive_failures: 0, opened_at: None }
    }
}

pub struct CircuitBreaker<C: Clock> {
    states: Mutex<HashMap<AgentId, BreakerState>>,
    clock: C,
    threshold: u32,
    cooldown: Duration,
}

impl<C: Clock> CircuitBreaker<C> {
    pub fn new(clock: C, threshold: u32, cooldown: Duration) -> Self {
        Self { states: Mutex::new(HashMap::new()), clock, threshold, cooldown }
    }

    /// Call before attempting a request. Returns an error if the breaker is
    /// currently open and the cooldown has not elapsed.
    pub fn before_call(&self, agent: AgentId) -> Result<(), TransportError> {
        let mut states = self.states.lock();
        let state = states.entry(agent).or_insert_with(BreakerState::fresh);
        if let Some(opened_at) = state.opened_at {
            if self.clock.now().duration_since(opened_at) < self.cooldown {
                return Err(TransportError::CircuitOpen);
            }
            // Cooldown elapsed: allow a trial call, reset the open marker so
            // a fresh run of failures is required to re-open.
            state.opened_at = None;
            state.consecutive_failures = 0;
        }
        Ok(())
    }

    pub fn record_success(&self, agent: AgentId) {
        let mut states = self.states.lock();
        let state = states.entry(agent).or_insert_with(BreakerState::fresh);
        state.consecutive_failures = 0;
        state.opened_at = None;
    }

    /// Returns `true` if this failure just tripped the breaker open.
    pub fn record_failure(&self, agent: AgentId) -> bool {
        let mut states = self.states.lock();
        let state = states.entry(agent).or_insert_with(BreakerState::fresh);
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.threshold && state.opened_at.is_none() {
            state.opened_at = Some(self.clock.now());
            true
        } else {
            false
        }
    }

    pub fn is_open(&self, agent: AgentId) -> bool {
        let states = self.states.lock();
        match states.get(&agent) {
            Some(state) => match state.opened_at {
                Some(opened_at) => self.clock.now().duration_since(opened_at) < self.cooldown,
                None => false,
            },
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "circuit_breaker_tests.rs"]
mod tests;
