//! Execution controls: timeout, retry with exponential backoff, circuit breaker.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{SandboxError, SandboxResult};

/// Configuration for sandboxed module execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Maximum wall-clock time for a single attempt (milliseconds).
    pub timeout_ms: u64,
    /// Retries after a runner fault (0 = run once). Module errors and
    /// timeouts are never retried.
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries (milliseconds).
    pub backoff_base_ms: u64,
    /// Consecutive runner faults that open the circuit breaker.
    pub breaker_threshold: u32,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_retries: 1,
            backoff_base_ms: 100,
            breaker_threshold: 3,
        }
    }
}

impl SandboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Atomic circuit breaker that opens after N consecutive failures.
///
/// Thread-safe via `AtomicU32`. Resets on success.
#[derive(Debug)]
pub struct CircuitBreaker {
    consecutive_failures: AtomicU32,
    threshold: u32,
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            threshold,
        }
    }

    /// Returns `true` if the breaker is open (too many consecutive failures).
    pub fn is_open(&self) -> bool {
        self.consecutive_failures.load(Ordering::Relaxed) >= self.threshold
    }

    /// Record a failure. Returns current consecutive failure count.
    pub fn record_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

/// Run `attempt` under timeout, retry and circuit-breaker controls.
///
/// The breaker is checked before each attempt. A module error means the
/// runner itself is healthy, so it resets the breaker and is returned as is.
pub async fn execute_with_controls<T, F, Fut>(
    config: &SandboxConfig,
    breaker: &CircuitBreaker,
    attempt: F,
) -> SandboxResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = SandboxResult<T>>,
{
    let max_attempts = config.max_retries + 1;
    let mut last_reason = String::new();

    for n in 1..=max_attempts {
        if breaker.is_open() {
            return Err(SandboxError::CircuitBreakerOpen {
                consecutive_failures: breaker.failure_count(),
                threshold: breaker.threshold(),
            });
        }

        let outcome = tokio::time::timeout(config.timeout(), attempt())
            .await
            .unwrap_or(Err(SandboxError::Timeout {
                limit_ms: config.timeout_ms,
            }));

        match outcome {
            Ok(value) => {
                breaker.record_success();
                return Ok(value);
            }
            Err(err @ SandboxError::Evaluation { .. }) => {
                breaker.record_success();
                return Err(err);
            }
            Err(err @ SandboxError::ExecutionFailed { .. }) | Err(err @ SandboxError::Io(_)) => {
                let failures = breaker.record_failure();
                debug!(attempt = n, failures, error = %err, "runner fault");
                last_reason = err.to_string();
                if n < max_attempts {
                    let delay = Duration::from_millis(config.backoff_base_ms * 2u64.pow(n - 1));
                    tokio::time::sleep(delay).await;
                }
            }
            Err(err) => {
                breaker.record_failure();
                return Err(err);
            }
        }
    }

    Err(SandboxError::ExecutionFailed {
        attempts: max_attempts,
        reason: last_reason,
    })
}
