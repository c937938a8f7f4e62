//! Centralized retry logic with exponential backoff and jitter
//!
//! Errors are classified via `SwapError::is_retryable` so non-recoverable
//! conditions (fund leak, drift, expired quote) are surfaced immediately and
//! never silently retried.

use crate::error::SwapError;
use crate::resilience::circuit_breaker::CircuitBreaker;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy with exponential backoff parameters
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 50,
            max_delay_ms: 2_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Calculate the backoff delay for a given attempt, with up to 25% jitter
    /// so concurrent callers fan out instead of retrying in lockstep
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let base =
            (self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32)) as u64;
        let capped = base.min(self.max_delay_ms);
        let jitter = (capped as f64 * 0.25 * fastrand::f64()) as u64;
        Duration::from_millis(capped + jitter)
    }
}

/// Run `op` under the policy, optionally gated by a circuit breaker.
///
/// The breaker is consulted before every attempt; an open circuit
/// short-circuits immediately with `SwapError::CircuitOpen` instead of
/// burning attempts against a known-bad dependency.
pub async fn retry_async<T, F, Fut>(
    policy: &RetryPolicy,
    breaker: Option<&CircuitBreaker>,
    op_name: &str,
    mut op: F,
) -> Result<T, SwapError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SwapError>>,
{
    let mut last_err: Option<SwapError> = None;

    for attempt in 0..policy.max_attempts {
        if let Some(cb) = breaker {
            if !cb.can_execute() {
                return Err(SwapError::CircuitOpen {
                    key: op_name.to_string(),
                });
            }
        }

        match op().await {
            Ok(value) => {
                if let Some(cb) = breaker {
                    cb.record_success();
                }
                return Ok(value);
            }
            Err(err) => {
                if let Some(cb) = breaker {
                    cb.record_failure();
                }

                if !err.is_retryable() || attempt + 1 == policy.max_attempts {
                    if attempt > 0 {
                        warn!(
                            operation = %op_name,
                            attempts = attempt + 1,
                            error = %err,
                            "Giving up after retries"
                        );
                    }
                    return Err(err);
                }

                let delay = policy.delay_for_attempt(attempt);
                debug!(
                    operation = %op_name,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after transient failure"
                );
                last_err = Some(err);
                tokio::time::sleep(delay).await;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| SwapError::internal(format!("{} exhausted retries", op_name))))
}
