use std::future::Future;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::{AgentError, Result};

/// How many times to try a remote call and how long to wait between tries.
///
/// `backoff[i]` is the delay after failure `i + 1`. When there are more
/// failures than delays the last delay is reused; an empty list retries
/// immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_secs(3, &[10, 30])
    }
}

impl RetryPolicy {
    pub fn from_secs(attempts: u32, backoff_secs: &[u64]) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff: backoff_secs.iter().map(|s| Duration::from_secs(*s)).collect(),
        }
    }

    /// A single attempt and no waiting.
    pub fn once() -> Self {
        Self {
            attempts: 1,
            backoff: Vec::new(),
        }
    }

    /// Delay to wait after the `failure`-th failed attempt (1-based).
    pub fn delay_after(&self, failure: u32) -> Duration {
        let idx = failure.saturating_sub(1) as usize;
        self.backoff
            .get(idx)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

/// Run `op` until it succeeds or the policy's attempts run out.
///
/// `op` receives the 1-based attempt number. Every attempt is identical from
/// the caller's point of view; nothing is rewritten between tries. The final
/// failure is wrapped in [`AgentError::Exhausted`].
pub async fn retry_with_backoff<T, F, Fut>(policy: &RetryPolicy, context: &str, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        info!(attempt, attempts, "{context} (attempt {attempt}/{attempts})");
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => {
                error!(attempt, error = %e, "{context} failed after {attempts} attempts");
                return Err(AgentError::Exhausted {
                    context: context.to_string(),
                    attempts,
                    last: Box::new(e),
                });
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    attempt,
                    error = %e,
                    delay_secs = delay.as_secs_f64(),
                    "{context} attempt {attempt}/{attempts} failed, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn transient() -> AgentError {
        AgentError::Rejected("not yet".into())
    }

    #[test]
    fn delay_reuses_last_entry() {
        let p = RetryPolicy::from_secs(5, &[10, 30]);
        assert_eq!(p.delay_after(1), Duration::from_secs(10));
        assert_eq!(p.delay_after(2), Duration::from_secs(30));
        assert_eq!(p.delay_after(4), Duration::from_secs(30));
        assert_eq!(RetryPolicy::once().delay_after(1), Duration::ZERO);
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        assert_eq!(RetryPolicy::from_secs(0, &[]).attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn third_attempt_success_waits_both_backoffs() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();
        let c = calls.clone();
        let value = retry_with_backoff(&RetryPolicy::default(), "turn 1", move |attempt| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                if attempt < 3 {
                    Err(transient())
                } else {
                    Ok(attempt)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_sleeps_twice_and_never_tries_a_fourth_time() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();
        let c = calls.clone();
        let err = retry_with_backoff(&RetryPolicy::default(), "turn 2", move |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(transient())
            }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(40));
        match err {
            AgentError::Exhausted { attempts, last, .. } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, AgentError::Rejected(_)));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_does_not_sleep() {
        let start = Instant::now();
        let value = retry_with_backoff(&RetryPolicy::default(), "turn 3", |_| async { Ok("ok") })
            .await
            .unwrap();
        assert_eq!(value, "ok");
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
