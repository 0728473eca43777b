// ── Resilience helpers ──
//
// Wrap SDK calls so failures come back as `DomainError`, optionally with
// retries for transient network kinds. The request pipeline itself never
// retries; callers opt in here.

use std::future::Future;
use std::time::Duration;

use pocketlink_api::Error as ApiError;
use tracing::{debug, warn};

use crate::error::{DomainError, classify};

/// Retry schedule for [`with_retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. `1` disables retries.
    pub max_attempts: u32,
    /// Delay after the first failure. Doubles on each further failure.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that runs the operation exactly once.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt + 1` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.min(16));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Await `call`, classifying any failure.
pub async fn safe_call<T, F>(call: F) -> Result<T, DomainError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    call.await.map_err(|e| {
        let domain = classify(&e);
        debug!(kind = domain.kind(), error = %e, "call failed");
        domain
    })
}

/// Run `op` until it succeeds, fails with a non-retryable kind, or the
/// policy's attempts are used up. The last error is returned.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, DomainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u32 = 0;

    loop {
        match safe_call(op()).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    kind = err.kind(),
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
