//! Exponential backoff with jitter for transient provider failures
//! (spec.md §4.2: "base 250 ms, factor 2, jitter ±20%, cap 10 s,
//! max attempts = config.max_retries default 3").

use goc_protocol::GocError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub factor: f64,
    pub jitter: f64,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub const DEFAULT: RetryPolicy = RetryPolicy {
        base_delay: Duration::from_millis(250),
        factor: 2.0,
        jitter: 0.2,
        cap: Duration::from_secs(10),
        max_attempts: 3,
    };

    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::DEFAULT
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let unjittered = self.base_delay.as_secs_f64() * self.factor.powi(attempt as i32);
        let capped = unjittered.min(self.cap.as_secs_f64());
        let jitter_span = capped * self.jitter;
        let jittered = rand::thread_rng().gen_range((capped - jitter_span).max(0.0)..=(capped + jitter_span));
        Duration::from_secs_f64(jittered)
    }
}

/// Call `f` up to `policy.max_attempts` times, retrying only on
/// [`GocError::is_retryable`] errors with exponential backoff between
/// attempts. Non-retryable errors and the final attempt's error are
/// returned immediately.
pub async fn retry_with_backoff<F, Fut, T>(policy: RetryPolicy, mut f: F) -> Result<T, GocError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, GocError>>,
{
    let mut attempt = 0;
    loop {
        match f(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying provider call");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goc_ids::CorrelationId;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures_within_budget() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::with_max_attempts(3)
        };
        let result = retry_with_backoff(policy, |_| {
            let count = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err(GocError::ProviderTransient {
                        provider: "claude".into(),
                        message: "503".into(),
                        correlation_id: CorrelationId::new(),
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_stop_immediately() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::with_max_attempts(3)
        };
        let err = retry_with_backoff(policy, |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<(), _>(GocError::SafetyRefused {
                    reason: "blocked".into(),
                    correlation_id: CorrelationId::new(),
                })
            }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, GocError::SafetyRefused { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausting_attempts_surfaces_last_error() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::with_max_attempts(2)
        };
        let attempts = AtomicU32::new(0);
        let err = retry_with_backoff(policy, |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<(), _>(GocError::ProviderTimeout {
                    provider: "gpt".into(),
                    elapsed_ms: 30_000,
                    correlation_id: CorrelationId::new(),
                })
            }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, GocError::ProviderTimeout { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
