//! # Circuit Breaker Module
//!
//! This module implements the circuit breaker pattern for catalog lookups.
//! When the catalog backend fails repeatedly, lookups fail fast for a while
//! instead of making every conversation wait for the full timeout.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::RecoveryConfig;

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

/// Circuit breaker for catalog lookups
///
/// # State Machine
///
/// - **Closed**: Normal operation, requests pass through
/// - **Open**: Failure threshold exceeded, requests fail fast
/// - **Half-Open**: Reset timeout elapsed, the next request is let through
///
/// # Configuration
///
/// Uses `RecoveryConfig` for:
/// - `circuit_breaker_threshold`: Failures before opening (default: 5)
/// - `circuit_breaker_reset_secs`: Time before attempting reset (default: 60s)
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    config: RecoveryConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    ///
    /// ```rust
    /// use ziggler_bot::config::RecoveryConfig;
    /// use ziggler_bot::circuit_breaker::CircuitBreaker;
    ///
    /// let circuit_breaker = CircuitBreaker::new(RecoveryConfig::default());
    /// assert!(!circuit_breaker.is_open());
    /// ```
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            config,
        }
    }

    /// Check if circuit breaker is open (blocking requests)
    ///
    /// Returns `true` when the failure count reached the threshold and the
    /// reset time has not elapsed. Once it has, the breaker closes again.
    pub fn is_open(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if state.failure_count >= self.config.circuit_breaker_threshold {
            if let Some(last_time) = state.last_failure_time {
                if last_time.elapsed() < Duration::from_secs(self.config.circuit_breaker_reset_secs) {
                    return true;
                }
                *state = BreakerState::default();
            }
        }
        false
    }

    /// Record a failed lookup
    pub fn record_failure(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.failure_count += 1;
        state.last_failure_time = Some(Instant::now());
    }

    /// Record a successful lookup, closing the breaker
    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = BreakerState::default();
    }

    /// Current consecutive failure count
    pub fn failure_count(&self) -> u32 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .failure_count
    }
}
