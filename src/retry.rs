//! Retry controller for transient provider failures.
//!
//! [`with_retry`] wraps a stream factory and yields the same event sequence
//! as the stream it opens. A transient failure that happens before the
//! attempt has yielded anything is retried after a backoff; anything else
//! propagates unchanged.

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use futures::future::BoxFuture;
use futures::stream;
use futures::StreamExt;
use rand::Rng;

use crate::constants::{
    MAX_RETRY_ATTEMPTS_DEFAULT, RETRY_BASE_SECS, RETRY_CAP_SECS, RETRY_HINT_MARGIN_SECS,
    RETRY_JITTER_RATIO,
};
use crate::provider::{EventStream, ProviderError};

/// Bounds and shape of the backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
    /// Upper bound of the uniform jitter, as a fraction of the backoff.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRY_ATTEMPTS_DEFAULT,
            base: Duration::from_secs(RETRY_BASE_SECS),
            cap: Duration::from_secs(RETRY_CAP_SECS),
            jitter: RETRY_JITTER_RATIO,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Wait before retry number `retry` (0-based).
    ///
    /// An explicit provider hint wins (plus a one second margin); otherwise
    /// `min(cap, base * 2^retry)` plus up to `jitter` of that, drawn uniformly.
    pub fn delay(&self, retry: u32, hint: Option<Duration>) -> Duration {
        if let Some(hint) = hint {
            return hint + Duration::from_secs(RETRY_HINT_MARGIN_SECS);
        }
        let backoff = self
            .base
            .saturating_mul(2u32.saturating_pow(retry.min(16)))
            .min(self.cap);
        let jitter = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(0.0..=self.jitter)
        } else {
            0.0
        };
        backoff + backoff.mul_f64(jitter)
    }
}

/// Observer notified at every retry boundary.
///
/// `pause` runs before the notice so a live status display can get out of
/// the way; `resume` runs after the sleep.
pub trait RetryHooks: Send + Sync {
    fn pause(&self) {}
    fn on_retry(&self, attempt: u32, max_attempts: u32, wait: Duration, error: &ProviderError);
    fn resume(&self) {}
}

/// Prints retry notices to stderr.
pub struct ConsoleRetryHooks;

impl RetryHooks for ConsoleRetryHooks {
    fn pause(&self) {
        eprintln!();
    }

    fn on_retry(&self, attempt: u32, max_attempts: u32, wait: Duration, error: &ProviderError) {
        let summary: String = error.to_string().chars().take(160).collect();
        eprintln!(
            "{} {} (attempt {}/{}, waiting {:.1}s)",
            "retrying:".yellow().bold(),
            summary.dimmed(),
            attempt,
            max_attempts,
            wait.as_secs_f64()
        );
    }
}

struct RetryState<F> {
    factory: F,
    policy: RetryPolicy,
    hooks: Arc<dyn RetryHooks>,
    attempts: u32,
    current: Option<EventStream>,
    yielded: bool,
    done: bool,
}

impl<F> RetryState<F> {
    /// Sleeps and returns `Ok` when `error` earns another attempt; hands the
    /// error back otherwise.
    async fn backoff(&mut self, error: ProviderError) -> Result<(), ProviderError> {
        if !error.is_transient() || self.attempts >= self.policy.max_attempts {
            if error.is_transient() {
                tracing::warn!(attempts = self.attempts, error = %error, "retries exhausted");
            }
            return Err(error);
        }
        let wait = self.policy.delay(self.attempts - 1, error.retry_hint());
        tracing::warn!(
            attempt = self.attempts,
            max_attempts = self.policy.max_attempts,
            wait_ms = wait.as_millis() as u64,
            error = %error,
            "transient provider error, backing off"
        );
        self.hooks.pause();
        self.hooks
            .on_retry(self.attempts, self.policy.max_attempts, wait, &error);
        tokio::time::sleep(wait).await;
        self.hooks.resume();
        Ok(())
    }
}

/// Wraps `factory` so transient failures are retried per `policy`.
///
/// Lazy: nothing is opened until the returned stream is first polled. Once
/// an attempt has yielded an event, later failures propagate instead of
/// restarting the turn, so text is never duplicated. The final error after
/// `max_attempts` is the last attempt's error, unmodified.
pub fn with_retry<F>(factory: F, policy: RetryPolicy, hooks: Arc<dyn RetryHooks>) -> EventStream
where
    F: FnMut() -> BoxFuture<'static, Result<EventStream, ProviderError>> + Send + 'static,
{
    let state = RetryState {
        factory,
        policy,
        hooks,
        attempts: 0,
        current: None,
        yielded: false,
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }
        loop {
            if st.current.is_none() {
                st.attempts += 1;
                st.yielded = false;
                match (st.factory)().await {
                    Ok(stream) => st.current = Some(stream),
                    Err(error) => match st.backoff(error).await {
                        Ok(()) => continue,
                        Err(error) => {
                            st.done = true;
                            return Some((Err(error), st));
                        }
                    },
                }
            }

            let Some(current) = st.current.as_mut() else {
                continue;
            };
            match current.next().await {
                Some(Ok(event)) => {
                    st.yielded = true;
                    return Some((Ok(event), st));
                }
                Some(Err(error)) => {
                    st.current = None;
                    if st.yielded {
                        st.done = true;
                        return Some((Err(error), st));
                    }
                    if let Err(error) = st.backoff(error).await {
                        st.done = true;
                        return Some((Err(error), st));
                    }
                }
                None => return None,
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::scripted::{rate_limited, ScriptedAdapter, Step};
    use crate::provider::StreamEvent;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct CountingHooks {
        pauses: AtomicU32,
        retries: AtomicU32,
        resumes: AtomicU32,
    }

    impl RetryHooks for CountingHooks {
        fn pause(&self) {
            self.pauses.fetch_add(1, Ordering::SeqCst);
        }
        fn on_retry(&self, _: u32, _: u32, _: Duration, _: &ProviderError) {
            self.retries.fetch_add(1, Ordering::SeqCst);
        }
        fn resume(&self) {
            self.resumes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn retrying(adapter: &Arc<ScriptedAdapter>, policy: RetryPolicy, hooks: Arc<CountingHooks>) -> EventStream {
        let provider = adapter.provider();
        let request = provider.request("", &[], Vec::new(), 0.0);
        with_retry(move || provider.open(request.clone()), policy, hooks)
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_rate_limits_then_success() {
        let adapter = ScriptedAdapter::new(vec![
            Step::Reject(rate_limited()),
            Step::Reject(rate_limited()),
            Step::text("hello"),
        ]);
        let hooks = Arc::new(CountingHooks::default());
        let events: Vec<_> = retrying(&adapter, RetryPolicy::default(), hooks.clone())
            .collect()
            .await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap(), &StreamEvent::TextDelta("hello".into()));
        assert_eq!(hooks.retries.load(Ordering::SeqCst), 2);
        assert_eq!(hooks.pauses.load(Ordering::SeqCst), 2);
        assert_eq!(hooks.resumes.load(Ordering::SeqCst), 2);
        assert_eq!(adapter.requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error_unchanged() {
        let adapter = ScriptedAdapter::new(
            (0..5)
                .map(|i| {
                    Step::Reject(ProviderError::Http {
                        status: 429,
                        message: format!("attempt {i}"),
                        retry_after: None,
                    })
                })
                .collect(),
        );
        let hooks = Arc::new(CountingHooks::default());
        let events: Vec<_> = retrying(&adapter, RetryPolicy::with_max_attempts(3), hooks.clone())
            .collect()
            .await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            Err(ProviderError::Http { message, .. }) => assert_eq!(message, "attempt 2"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(adapter.requests().len(), 3);
        assert_eq!(hooks.retries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transient_fails_on_first_attempt() {
        let adapter = ScriptedAdapter::new(vec![
            Step::Reject(ProviderError::Auth {
                status: 401,
                message: "invalid key".into(),
            }),
            Step::text("never"),
        ]);
        let hooks = Arc::new(CountingHooks::default());
        let events: Vec<_> = retrying(&adapter, RetryPolicy::default(), hooks.clone())
            .collect()
            .await;

        assert!(matches!(events[0], Err(ProviderError::Auth { .. })));
        assert_eq!(adapter.requests().len(), 1);
        assert_eq!(hooks.retries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_stream_failure_before_first_event_is_retried() {
        let adapter = ScriptedAdapter::new(vec![
            Step::Reply(vec![Err(ProviderError::Stream("overloaded_error: Overloaded".into()))]),
            Step::text("ok"),
        ]);
        let hooks = Arc::new(CountingHooks::default());
        let events: Vec<_> = retrying(&adapter, RetryPolicy::default(), hooks.clone())
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_ok());
        assert_eq!(hooks.retries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_after_output_is_not_retried() {
        let adapter = ScriptedAdapter::new(vec![
            Step::Reply(vec![
                Ok(StreamEvent::TextDelta("partial".into())),
                Err(rate_limited()),
            ]),
            Step::text("duplicate"),
        ]);
        let hooks = Arc::new(CountingHooks::default());
        let events: Vec<_> = retrying(&adapter, RetryPolicy::default(), hooks.clone())
            .collect()
            .await;
        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        assert!(events[1].is_err());
        assert_eq!(adapter.remaining(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleeps_are_honoured() {
        let adapter = ScriptedAdapter::new(vec![
            Step::Reject(ProviderError::Http {
                status: 429,
                message: String::new(),
                retry_after: Some(10),
            }),
            Step::text("late"),
        ]);
        let start = tokio::time::Instant::now();
        let events: Vec<_> = retrying(&adapter, RetryPolicy::default(), Arc::new(CountingHooks::default()))
            .collect()
            .await;
        assert!(events[0].is_ok());
        assert!(start.elapsed() >= Duration::from_secs(11));
    }

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay(0, None), Duration::from_secs(5));
        assert_eq!(policy.delay(1, None), Duration::from_secs(10));
        assert_eq!(policy.delay(3, None), Duration::from_secs(40));
        assert_eq!(policy.delay(4, None), Duration::from_secs(60));
        assert_eq!(policy.delay(30, None), Duration::from_secs(60));
        assert_eq!(
            policy.delay(0, Some(Duration::from_secs(20))),
            Duration::from_secs(21)
        );

        let jittered = RetryPolicy::default();
        for _ in 0..50 {
            let d = jittered.delay(2, None);
            assert!(d >= Duration::from_secs(20) && d <= Duration::from_secs(26));
        }
    }
}
