//! Deadline and bounded-retry primitives for external calls.
//!
//! [`with_deadline`] bounds any fallible future by a timeout and tags the
//! failure with a label; [`with_retry`] re-runs an operation while its
//! error is [`Retryable`], sleeping `backoff(attempt)` between attempts;
//! [`with_retry_cancellable`] also cuts that sleep short on cancellation.
//! Every collaborator call in the pipeline goes through `with_deadline`;
//! only image generation is additionally wrapped in `with_retry_cancellable`.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Retry classification
// ---------------------------------------------------------------------------

/// Classifies an error as transient (worth another attempt) or final.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

// ---------------------------------------------------------------------------
// Deadline
// ---------------------------------------------------------------------------

/// Failure of a deadline-bounded operation.
#[derive(Debug, thiserror::Error)]
pub enum DeadlineError<E> {
    /// The operation did not finish within `timeout_ms`.
    #[error("{label} timed out after {timeout_ms}ms")]
    Timeout { label: String, timeout_ms: u64 },

    /// The surrounding run was cancelled while the operation was pending.
    #[error("{label} was cancelled")]
    Cancelled { label: String },

    /// The operation itself failed before the deadline.
    #[error("{0}")]
    Operation(E),
}

impl<E: Retryable> Retryable for DeadlineError<E> {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Cancelled { .. } => false,
            Self::Operation(e) => e.is_retryable(),
        }
    }
}

/// Run `operation`, failing with [`DeadlineError::Timeout`] if it does not
/// complete within `timeout`.
///
/// The timeout error always carries `label` and the configured timeout,
/// regardless of how close the operation was to finishing. The pending
/// future is dropped on timeout.
pub async fn with_deadline<T, E, F>(
    operation: F,
    timeout: Duration,
    label: &str,
) -> Result<T, DeadlineError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result.map_err(DeadlineError::Operation),
        Err(_elapsed) => {
            let timeout_ms = timeout.as_millis() as u64;
            tracing::warn!(label, timeout_ms, "Operation exceeded its deadline");
            Err(DeadlineError::Timeout {
                label: label.to_string(),
                timeout_ms,
            })
        }
    }
}

/// Like [`with_deadline`], but also resolves to [`DeadlineError::Cancelled`]
/// as soon as `cancel` is triggered.
pub async fn with_deadline_cancellable<T, E, F>(
    operation: F,
    timeout: Duration,
    label: &str,
    cancel: &CancellationToken,
) -> Result<T, DeadlineError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!(label, "Operation cancelled");
            Err(DeadlineError::Cancelled { label: label.to_string() })
        }
        result = with_deadline(operation, timeout, label) => result,
    }
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

/// A successful result together with the attempt that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    pub value: T,
    /// 1-based attempt number that succeeded.
    pub attempts: u32,
}

/// The operation gave up: either attempts ran out or a non-retryable
/// error was returned.
#[derive(Debug, thiserror::Error)]
#[error("gave up after {attempts} attempt(s): {last_error}")]
pub struct ExhaustedError<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Linear backoff: `attempt * base`.
pub fn linear_backoff(base: Duration) -> impl Fn(u32) -> Duration {
    move |attempt| base.saturating_mul(attempt)
}

/// Run `operation` up to `max_attempts` times (at least once).
///
/// The closure receives the 1-based attempt number. A retryable error
/// triggers a sleep of `backoff(attempt)` followed by the next attempt; a
/// non-retryable error, or a retryable one on the final attempt, ends the
/// loop with [`ExhaustedError`].
pub async fn with_retry<T, E, F, Fut, B>(
    operation: F,
    max_attempts: u32,
    backoff: B,
) -> Result<Attempted<T>, ExhaustedError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
    B: Fn(u32) -> Duration,
{
    retry_loop(operation, max_attempts, backoff, None)
        .await
        .map_err(|stop| match stop {
            Stopped::Exhausted(e) => e,
            Stopped::Cancelled {
                attempts,
                last_error,
            } => ExhaustedError {
                attempts,
                last_error,
            },
        })
}

/// Like [`with_retry`], for operations bounded by
/// [`with_deadline_cancellable`].
///
/// Triggering `cancel` during a backoff ends the loop at once with
/// [`DeadlineError::Cancelled`] carrying `label`; no further attempt is made.
pub async fn with_retry_cancellable<T, E, F, Fut, B>(
    operation: F,
    max_attempts: u32,
    backoff: B,
    label: &str,
    cancel: &CancellationToken,
) -> Result<Attempted<T>, ExhaustedError<DeadlineError<E>>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, DeadlineError<E>>>,
    E: Retryable + Display,
    B: Fn(u32) -> Duration,
{
    retry_loop(operation, max_attempts, backoff, Some(cancel))
        .await
        .map_err(|stop| match stop {
            Stopped::Exhausted(e) => e,
            Stopped::Cancelled { attempts, .. } => ExhaustedError {
                attempts,
                last_error: DeadlineError::Cancelled {
                    label: label.to_string(),
                },
            },
        })
}

/// Why [`retry_loop`] gave up.
enum Stopped<E> {
    Exhausted(ExhaustedError<E>),
    /// Cancelled while backing off after `last_error`.
    Cancelled { attempts: u32, last_error: E },
}

async fn retry_loop<T, E, F, Fut, B>(
    mut operation: F,
    max_attempts: u32,
    backoff: B,
    cancel: Option<&CancellationToken>,
) -> Result<Attempted<T>, Stopped<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
    B: Fn(u32) -> Duration,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => {
                return Ok(Attempted {
                    value,
                    attempts: attempt,
                })
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = backoff(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying",
                );
                let Some(cancel) = cancel else {
                    tokio::time::sleep(delay).await;
                    continue;
                };
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!(attempt, "Retry backoff cancelled");
                        return Err(Stopped::Cancelled {
                            attempts: attempt,
                            last_error: e,
                        });
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => {
                return Err(Stopped::Exhausted(ExhaustedError {
                    attempts: attempt,
                    last_error: e,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum TestError {
        Transient,
        Fatal,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Transient)
        }
    }

    // -- Deadline --

    #[tokio::test(start_paused = true)]
    async fn fast_operation_returns_its_value() {
        let result: Result<u32, DeadlineError<TestError>> =
            with_deadline(async { Ok(7) }, Duration::from_secs(1), "fast").await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_operation_times_out_with_label_and_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, TestError>("eventually")
        };
        let result = with_deadline(slow, Duration::from_millis(250), "generate job 3").await;
        assert_matches!(
            result,
            Err(DeadlineError::Timeout { label, timeout_ms: 250 }) if label == "generate job 3"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn operation_error_is_passed_through() {
        let result: Result<(), _> =
            with_deadline(async { Err(TestError::Fatal) }, Duration::from_secs(1), "op").await;
        assert_matches!(result, Err(DeadlineError::Operation(TestError::Fatal)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_token_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<(), DeadlineError<TestError>> = with_deadline_cancellable(
            std::future::pending(),
            Duration::from_secs(60),
            "upload",
            &cancel,
        )
        .await;
        assert_matches!(result, Err(DeadlineError::Cancelled { label }) if label == "upload");
    }

    #[test]
    fn deadline_errors_classify_retryability() {
        let timeout: DeadlineError<TestError> = DeadlineError::Timeout {
            label: "x".into(),
            timeout_ms: 1,
        };
        assert!(timeout.is_retryable());
        assert!(!DeadlineError::<TestError>::Cancelled { label: "x".into() }.is_retryable());
        assert!(DeadlineError::Operation(TestError::Transient).is_retryable());
        assert!(!DeadlineError::Operation(TestError::Fatal).is_retryable());
    }

    // -- Retry --

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_final_attempt_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = with_retry(
            move |_| async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(TestError::Transient)
                } else {
                    Ok("image")
                }
            },
            3,
            linear_backoff(Duration::from_millis(10)),
        )
        .await
        .unwrap();

        assert_eq!(result.value, "image");
        assert_eq!(result.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_attempts() {
        let result: Result<Attempted<()>, _> = with_retry(
            |_| async { Err(TestError::Transient) },
            4,
            linear_backoff(Duration::from_millis(10)),
        )
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.attempts, 4);
        assert_eq!(err.last_error, TestError::Transient);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<Attempted<()>, _> = with_retry(
            move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Fatal)
            },
            5,
            linear_backoff(Duration::from_millis(10)),
        )
        .await;
        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_grows_linearly_between_attempts() {
        let start = tokio::time::Instant::now();
        let _ = with_retry(
            |_| async { Err::<(), _>(TestError::Transient) },
            3,
            linear_backoff(Duration::from_millis(100)),
        )
        .await;
        // 1 x 100ms after attempt 1, 2 x 100ms after attempt 2, none after the last.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(400), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_max_attempts_still_runs_once() {
        let result = with_retry(
            |attempt| async move { Ok::<_, TestError>(attempt) },
            0,
            linear_backoff(Duration::from_millis(1)),
        )
        .await
        .unwrap();
        assert_eq!(result.value, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let calls = AtomicU32::new(0);
        let counter = &calls;
        let token = &cancel;
        let start = tokio::time::Instant::now();
        let result: Result<Attempted<()>, _> = with_retry_cancellable(
            move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                with_deadline_cancellable(
                    async { Err(TestError::Transient) },
                    Duration::from_secs(5),
                    "generate job 0",
                    token,
                )
                .await
            },
            3,
            linear_backoff(Duration::from_secs(3600)),
            "generate job 0",
            &cancel,
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_matches!(err.last_error, DeadlineError::Cancelled { label } if label == "generate job 0");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn uncancelled_retry_behaves_like_with_retry() {
        let cancel = CancellationToken::new();
        let token = &cancel;
        let result = with_retry_cancellable(
            move |attempt| async move {
                with_deadline_cancellable(
                    async move {
                        if attempt < 2 {
                            Err(TestError::Transient)
                        } else {
                            Ok(attempt)
                        }
                    },
                    Duration::from_secs(5),
                    "op",
                    token,
                )
                .await
            },
            3,
            linear_backoff(Duration::from_millis(10)),
            "op",
            &cancel,
        )
        .await
        .unwrap();
        assert_eq!(result.attempts, 2);
        assert_eq!(result.value, 2);
    }

    #[test]
    fn linear_backoff_multiplies_base() {
        let backoff = linear_backoff(Duration::from_millis(250));
        assert_eq!(backoff(1), Duration::from_millis(250));
        assert_eq!(backoff(3), Duration::from_millis(750));
    }
}
