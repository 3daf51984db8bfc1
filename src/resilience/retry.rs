//! # Bounded Retry and Store Health Tracking
//!
//! Transient store failures are retried with exponential backoff up to the
//! configured attempt limit, then handed back to the caller as a degraded-
//! mode signal. Non-transient errors are never retried. `StoreHealth` counts
//! consecutive exhausted retries across the whole process; crossing the
//! threshold means the persistence layer itself is unhealthy and warrants a
//! CRITICAL event.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::warn;

use crate::error::{CoordinatorError, Result};

/// Backoff parameters for transient store failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// Delay before the given retry (1-based attempt that just failed).
    fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = self
            .backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        exp.min(self.backoff_max)
    }
}

/// Run `operation`, retrying transient failures with backoff. Non-transient
/// errors propagate immediately.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &'static str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.backoff_for(attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient store failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Consecutive-failure tracker for the persistence layer. A run of
/// `threshold` exhausted retries is itself a CRITICAL signal; a single
/// success resets the run.
#[derive(Debug)]
pub struct StoreHealth {
    consecutive_failures: AtomicU32,
    threshold: u32,
}

impl StoreHealth {
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            threshold: threshold.max(1),
        }
    }

    /// Record an exhausted-retry failure. Returns `true` exactly when the
    /// threshold is crossed, so the caller escalates once per degradation
    /// episode rather than on every subsequent failure.
    pub fn record_failure(&self) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        failures == self.threshold
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
    }

    pub fn is_degraded(&self) -> bool {
        self.consecutive_failures.load(Ordering::Acquire) >= self.threshold
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }
}
