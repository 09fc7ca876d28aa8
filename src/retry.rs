//! Centralized retry/backoff helper (spec §9: "centralize in a small retry
//! helper parameterized by (max_attempts, base_delay, factor, jitter) to
//! keep C5/C6/C7 uniform"). Used by the Forwarder and the Storage Sink
//! Manager's repair path.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with jitter. `base 500ms, factor 2, max 3 attempts,
/// jitter ±20%` is the Routing Engine's forward-retry policy (§4.5); other
/// call sites may construct their own `RetryPolicy`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub jitter: f64,
}

impl RetryPolicy {
    pub const fn forward_default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            factor: 2.0,
            jitter: 0.2,
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay.as_secs_f64() * self.factor.powi(attempt as i32);
        let jitter_span = scaled * self.jitter;
        let offset = rand::thread_rng().gen_range(-jitter_span..=jitter_span);
        Duration::from_secs_f64((scaled + offset).max(0.0))
    }
}

/// Run `op` up to `policy.max_attempts` times, sleeping with exponential
/// backoff between attempts. Returns the last error if every attempt
/// fails.
pub async fn retry<F, Fut, T, E>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut last_err = None;
    for attempt in 0..policy.max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                last_err = Some(e);
                if attempt + 1 < policy.max_attempts {
                    tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                }
            }
        }
    }
    Err(last_err.expect("at least one attempt always runs"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            factor: 2.0,
            jitter: 0.0,
        };
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry(&policy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_up_to_max_attempts_then_fails() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            factor: 1.0,
            jitter: 0.0,
        };
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry(&policy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("nope")
        })
        .await;
        assert_eq!(result, Err("nope"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn succeeds_on_a_later_attempt() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            factor: 1.0,
            jitter: 0.0,
        };
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry(&policy, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 1 { Err("nope") } else { Ok(7) }
        })
        .await;
        assert_eq!(result, Ok(7));
    }
}
