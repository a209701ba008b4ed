//! Bounded retry with delay between attempts.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use operators::NodeError;

use crate::{
    clock::Clock,
    error::RetryError,
    observability::{report, AttemptEvent, AttemptOutcome, ObservabilitySink},
};

/// Delay between a failed attempt and the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `base * 2^(attempt - 1)`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                base.checked_mul(factor).unwrap_or(max).min(max)
            }
        }
    }
}

/// Decides whether a failure deserves another attempt.
pub type RetryClassifier = Arc<dyn Fn(&NodeError) -> bool + Send + Sync>;

/// Retry configuration for a task's operation.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Treated as at least 1.
    pub max_attempts: u32,
    pub backoff: Backoff,
    classifier: Option<RetryClassifier>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Fixed(Duration::from_secs(5 * 60)),
            classifier: None,
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("custom_classifier", &self.classifier.is_some())
            .finish()
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
            classifier: None,
        }
    }

    /// Only try once.
    pub fn never() -> Self {
        Self::new(1, Backoff::Fixed(Duration::ZERO))
    }

    /// Replace the default classification ([`NodeError::is_retryable`]).
    pub fn with_classifier(
        mut self,
        classifier: impl Fn(&NodeError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    pub fn is_retryable(&self, error: &NodeError) -> bool {
        match &self.classifier {
            Some(classify) => classify(error),
            None => error.is_retryable(),
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are used up.
    ///
    /// `op` receives the 1-based attempt number. On success returns the value
    /// and the number of attempts made. Every attempt is reported to `sink`.
    pub async fn run<T, F, Fut>(
        &self,
        task_id: &str,
        clock: &dyn Clock,
        sink: &dyn ObservabilitySink,
        mut op: F,
    ) -> Result<(T, u32), RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, NodeError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let started = clock.now();
            let result = op(attempt).await;
            let duration_ms = (clock.now() - started).num_milliseconds().max(0) as u64;

            let error = match result {
                Ok(value) => {
                    report(
                        sink,
                        &AttemptEvent {
                            task_id: task_id.to_string(),
                            attempt,
                            duration_ms,
                            outcome: AttemptOutcome::Succeeded,
                        },
                    );
                    return Ok((value, attempt));
                }
                Err(error) => error,
            };

            let will_retry = attempt < max_attempts && self.is_retryable(&error);
            report(
                sink,
                &AttemptEvent {
                    task_id: task_id.to_string(),
                    attempt,
                    duration_ms,
                    outcome: AttemptOutcome::Failed {
                        error: error.to_string(),
                        will_retry,
                    },
                },
            );

            if !will_retry {
                return Err(RetryError {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.backoff.delay_for(attempt);
            warn!(
                "task '{}' failed (attempt {}/{}), retrying in {:?}: {}",
                task_id, attempt, max_attempts, delay, error
            );
            clock.sleep(delay).await;
        }
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingSink, RecordingSink, TestClock};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> NodeError {
        NodeError::Operation("connection reset".into())
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_operation_runs_exactly_max_attempts() {
        let clock = TestClock::new();
        let sink = RecordingSink::new();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(4, Backoff::Fixed(Duration::from_secs(300)));

        let err = policy
            .run("Stage_events", &clock, &sink, |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    Err::<(), _>(NodeError::Operation(format!("attempt {attempt} failed")))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(err.attempts, 4);
        assert_eq!(err.last, NodeError::Operation("attempt 4 failed".into()));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(300); 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_transient_failures_reports_attempt_count() {
        let clock = TestClock::new();
        let sink = RecordingSink::new();
        let policy = RetryPolicy::default();

        let (value, attempts) = policy
            .run("Load_songplays_fact_table", &clock, &sink, |attempt| async move {
                if attempt < 3 {
                    Err(transient())
                } else {
                    Ok(42)
                }
            })
            .await
            .unwrap();

        assert_eq!((value, attempts), (42, 3));
        let events = sink.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].outcome, AttemptOutcome::Succeeded);
        assert!(matches!(
            events[0].outcome,
            AttemptOutcome::Failed { will_retry: true, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn data_quality_failure_is_not_retried() {
        let clock = TestClock::new();
        let sink = RecordingSink::new();
        let calls = AtomicU32::new(0);

        let err = RetryPolicy::default()
            .run("Run_data_quality_checks", &clock, &sink, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(NodeError::DataQuality {
                        failures: vec![],
                        row_counts: BTreeMap::new(),
                    })
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.attempts, 1);
        assert!(clock.sleeps().is_empty());
        assert!(matches!(
            sink.events()[0].outcome,
            AttemptOutcome::Failed { will_retry: false, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn custom_classifier_overrides_default() {
        let clock = TestClock::new();
        let sink = RecordingSink::new();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Backoff::Fixed(Duration::from_secs(1)))
            .with_classifier(|_| false);

        policy
            .run("Stage_songs", &clock, &sink, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(transient()) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_sink_never_fails_the_operation() {
        let clock = TestClock::new();
        let (value, attempts) = RetryPolicy::default()
            .run("Begin_execution", &clock, &FailingSink, |_| async { Ok("done") })
            .await
            .unwrap();
        assert_eq!((value, attempts), ("done", 1));
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_duration_is_measured_on_the_clock() {
        let clock = TestClock::new();
        let sink = RecordingSink::new();

        RetryPolicy::never()
            .run("Load_time_dim_table", &clock, &sink, |_| async {
                tokio::time::sleep(Duration::from_millis(1500)).await;
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(sink.events()[0].duration_ms, 1500);
    }

    #[test]
    fn exponential_backoff_doubles_up_to_cap() {
        let backoff = Backoff::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(10),
        };
        let delays: Vec<u64> = (1..=6).map(|a| backoff.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_max_attempts_still_tries_once() {
        let clock = TestClock::new();
        let calls = AtomicU32::new(0);

        let err = RetryPolicy::new(0, Backoff::Fixed(Duration::ZERO))
            .run("Stop_execution", &clock, &RecordingSink::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(transient()) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.attempts, 1);
    }
}
