use std::{fmt, future::Future, time::Duration};

use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tracing::warn;

use super::GenerationError;

pub type RetryPredicate = fn(&GenerationError) -> bool;

/// Client-side retry strategy: how many retries, the backoff curve and
/// which errors qualify.
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// When set, a `Retry-After` hint longer than `max_delay` ends the retries.
    pub honor_retry_after: bool,
    pub retryable: RetryPredicate,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("honor_retry_after", &self.honor_retry_after)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            honor_retry_after: true,
            retryable: GenerationError::is_transient,
        }
    }

    /// No waiting between attempts; `Retry-After` is ignored.
    pub fn immediate(max_retries: usize) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            honor_retry_after: false,
            retryable: GenerationError::is_transient,
        }
    }

    pub fn with_predicate(mut self, retryable: RetryPredicate) -> Self {
        self.retryable = retryable;
        self
    }

    /// Delays before each retry: base, 2x base, 4x base ... capped and jittered.
    pub fn backoff(&self) -> impl Iterator<Item = Duration> + Send {
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        ExponentialBackoff::from_millis(2)
            .factor(base_ms / 2)
            .max_delay(self.max_delay)
            .map(jitter)
            .take(self.max_retries)
    }

    /// A rate-limited error sets a floor on the wait. `None` when the
    /// provider asks for a longer wait than `max_delay` allows.
    pub fn delay_for(&self, backoff: Duration, err: &GenerationError) -> Option<Duration> {
        let backoff = backoff.min(self.max_delay);
        let retry_after = err
            .retry_after()
            .filter(|_| self.honor_retry_after)
            .map(Duration::from_secs);

        match retry_after {
            None => Some(backoff),
            Some(wait) if wait > self.max_delay => None,
            Some(wait) => Some(backoff.max(wait)),
        }
    }

    pub async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        mut action: F,
    ) -> Result<T, GenerationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GenerationError>>,
    {
        let mut delays = self.backoff();
        let mut attempt: usize = 0;

        loop {
            attempt += 1;
            let err = match action().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !(self.retryable)(&err) {
                return Err(err);
            }

            let Some(backoff) = delays.next() else {
                warn!(
                    operation,
                    attempt,
                    code = err.code(),
                    "Retries exhausted"
                );
                return Err(err);
            };

            let Some(delay) = self.delay_for(backoff, &err) else {
                warn!(
                    operation,
                    attempt,
                    code = err.code(),
                    retry_after_secs = err.retry_after(),
                    "Provider asked to wait longer than the retry cap, giving up"
                );
                return Err(err);
            };
            warn!(
                operation,
                attempt,
                code = err.code(),
                retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Transient provider error, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn network() -> GenerationError {
        GenerationError::Network("connection reset".into())
    }

    #[tokio::test]
    async fn transient_errors_are_retried_up_to_the_limit() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let policy = RetryPolicy::immediate(2);

        let result: Result<(), _> = policy
            .run("test", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(network())
            })
            .await;

        assert_eq!(result, Err(network()));
        assert_eq!(calls.load(Ordering::SeqCst), 3, "one call plus two retries");
    }

    #[tokio::test]
    async fn terminal_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let policy = RetryPolicy::immediate(5);

        let result: Result<(), _> = policy
            .run("test", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(GenerationError::Auth {
                    status: 401,
                    message: "bad key".into(),
                })
            })
            .await;

        assert!(matches!(result, Err(GenerationError::Auth { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_after_transient_failure() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let policy = RetryPolicy::immediate(2);

        let result = policy
            .run("test", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(network())
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn custom_predicate_replaces_default() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let policy = RetryPolicy::immediate(3).with_predicate(|_| false);

        let _: Result<(), _> = policy
            .run("test", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(network())
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    fn rate_limited(retry_after: u64) -> GenerationError {
        GenerationError::RateLimited {
            retry_after: Some(retry_after),
            message: String::new(),
        }
    }

    #[test]
    fn retry_after_is_a_floor_on_the_delay() {
        let policy = RetryPolicy::new(2);

        assert_eq!(
            policy.delay_for(Duration::from_millis(200), &rate_limited(3)),
            Some(Duration::from_secs(3))
        );
        assert_eq!(
            policy.delay_for(Duration::from_millis(200), &rate_limited(8)),
            Some(policy.max_delay)
        );
        assert_eq!(
            policy.delay_for(Duration::from_millis(200), &rate_limited(600)),
            None,
            "a wait beyond the cap is not shortened"
        );
        assert_eq!(
            policy.delay_for(Duration::from_millis(200), &network()),
            Some(Duration::from_millis(200))
        );
        assert_eq!(
            RetryPolicy::immediate(2).delay_for(Duration::ZERO, &rate_limited(600)),
            Some(Duration::ZERO)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn long_retry_after_returns_without_retrying() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let policy = RetryPolicy::new(3);
        let started = tokio::time::Instant::now();

        let result: Result<(), _> = policy
            .run("test", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(rate_limited(30))
            })
            .await;

        assert_eq!(result, Err(rate_limited(30)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn short_retry_after_is_waited_out() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let policy = RetryPolicy::new(1);
        let started = tokio::time::Instant::now();

        let result = policy
            .run("test", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(rate_limited(5))
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[test]
    fn backoff_yields_one_delay_per_retry_within_cap() {
        let policy = RetryPolicy::new(4);
        let delays: Vec<_> = policy.backoff().collect();

        assert_eq!(delays.len(), 4);
        assert!(delays.iter().all(|delay| *delay <= policy.max_delay));
    }
}
