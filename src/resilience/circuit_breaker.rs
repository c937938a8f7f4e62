//! Per-dependency circuit breakers
//!
//! A breaker is keyed per logical dependency (`rpc:<method>`,
//! `api:<provider>`) so a persistently failing dependency is temporarily
//! short-circuited instead of retried forever. States follow the usual
//! closed → open → half-open cycle.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Dependency disabled until the cooldown elapses
    Open,
    /// Probing whether the dependency recovered
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    half_open_successes: u32,
    last_failure: Option<Instant>,
}

/// Circuit breaker for a single logical dependency
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    failure_threshold: u32,
    cooldown: Duration,
    half_open_success_threshold: u32,
    key: String,
}

impl CircuitBreaker {
    pub fn new(key: impl Into<String>, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                half_open_successes: 0,
                last_failure: None,
            }),
            failure_threshold,
            cooldown,
            half_open_success_threshold: 2,
            key: key.into(),
        }
    }

    /// Check if a request may go out; transitions open → half-open once the
    /// cooldown has elapsed
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|t| t.elapsed() >= self.cooldown)
                    .unwrap_or(true);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    info!(key = %self.key, "Circuit half-open, probing dependency");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.half_open_success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    info!(key = %self.key, "Circuit closed after recovery");
                }
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());

        // A half-open probe failure reopens immediately
        let should_open = inner.state == CircuitState::HalfOpen
            || inner.failure_count >= self.failure_threshold;
        if should_open && inner.state != CircuitState::Open {
            inner.state = CircuitState::Open;
            warn!(
                key = %self.key,
                failures = inner.failure_count,
                "Circuit opened"
            );
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }
}

/// Registry of breakers keyed by logical dependency name
///
/// Constructed once at startup and shared by reference; breakers are created
/// lazily on first use of a key.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl BreakerRegistry {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            breakers: DashMap::new(),
            failure_threshold,
            cooldown,
        }
    }

    /// Get or create the breaker for a dependency key
    pub fn breaker(&self, key: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(key) {
            return Arc::clone(&existing);
        }
        let created = Arc::new(CircuitBreaker::new(
            key,
            self.failure_threshold,
            self.cooldown,
        ));
        self.breakers
            .entry(key.to_string())
            .or_insert(created)
            .clone()
    }

    /// Snapshot of all breaker states for monitoring
    pub fn states(&self) -> Vec<(String, CircuitState)> {
        self.breakers
            .iter()
            .map(|e| (e.key().clone(), e.value().state()))
            .collect()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_after_threshold() {
        let cb = CircuitBreaker::new("api:test", 3, Duration::from_secs(60));
        assert!(cb.can_execute());

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_execute());
    }

    #[test]
    fn test_half_open_after_cooldown_then_closes() {
        let cb = CircuitBreaker::new("api:test", 1, Duration::from_millis(0));
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        // Zero cooldown: next check transitions to half-open
        assert!(cb.can_execute());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::new("api:test", 1, Duration::from_millis(0));
        cb.record_failure();
        assert!(cb.can_execute()); // half-open
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_success_resets_failure_count() {
        let cb = CircuitBreaker::new("api:test", 3, Duration::from_secs(60));
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn test_registry_keys_are_independent() {
        let registry = BreakerRegistry::new(1, Duration::from_secs(60));
        let rpc = registry.breaker("rpc:get_balance");
        let api = registry.breaker("api:relaybridge");

        rpc.record_failure();
        assert_eq!(rpc.state(), CircuitState::Open);
        assert_eq!(api.state(), CircuitState::Closed);

        // Same key returns the same breaker
        assert_eq!(
            registry.breaker("rpc:get_balance").state(),
            CircuitState::Open
        );
    }
}
