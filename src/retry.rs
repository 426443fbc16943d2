//! Retry policy, per-call retry state and the retry driver.
//!
//! A logical call is driven by [`with_retry`], which owns a [`RetryState`] and
//! repeatedly invokes a single-attempt function until it succeeds, fails with a
//! terminal error, or spends the retry budget described by a [`RetryPolicy`].
//! Whether a given failure is worth another attempt is decided by a
//! [`RetryPredicate`].

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;

/// The backoff schedule and timeout growth for one logical call.
///
/// For attempt `k` (1-indexed) the timeout is `base_timeout * k`. The backoff
/// before attempt `k + 1` is `backoff_unit * 2^(k + 1)`. Neither value depends
/// on the other, and nothing caps the total elapsed time of a call.
///
/// # Examples
///
/// ```
/// use platform_client::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(3, Duration::from_secs(60));
///
/// assert_eq!(policy.timeout_for_attempt(2), Duration::from_secs(120));
/// assert_eq!(policy.backoff_delay(1), Duration::from_secs(4));
/// assert_eq!(policy.backoff_delay(3), Duration::from_secs(16));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// The maximum number of retries after the initial attempt.
    pub max_retries: usize,
    /// The timeout of the first attempt.
    pub base_timeout: Duration,
    /// The unit the exponential backoff is expressed in.
    pub backoff_unit: Duration,
}

impl RetryPolicy {
    /// Creates a policy with a backoff unit of one second.
    pub fn new(max_retries: usize, base_timeout: Duration) -> Self {
        Self {
            max_retries,
            base_timeout,
            backoff_unit: Duration::from_secs(1),
        }
    }

    /// Sets the unit the backoff schedule is multiplied by.
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Replaces the base timeout when a per-call override is present.
    pub fn with_base_timeout(mut self, timeout: Option<Duration>) -> Self {
        if let Some(timeout) = timeout {
            self.base_timeout = timeout;
        }
        self
    }

    /// Returns the delay to wait after the `retry`-th retry has been scheduled.
    ///
    /// `retry` is the post-increment retry counter (1 for the first retry).
    pub fn backoff_delay(&self, retry: usize) -> Duration {
        let exponent = retry.saturating_add(1).min(31) as u32;
        self.backoff_unit.saturating_mul(2u32.saturating_pow(exponent))
    }

    /// Returns the timeout for the given attempt (1-indexed).
    pub fn timeout_for_attempt(&self, attempt: usize) -> Duration {
        let attempt = u32::try_from(attempt.max(1)).unwrap_or(u32::MAX);
        self.base_timeout.saturating_mul(attempt)
    }
}

/// Retry bookkeeping for a single logical call.
///
/// Created by [`with_retry`] before the first attempt and handed by value to
/// every attempt. It never outlives the call it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    retries: usize,
    timeout: Duration,
    has_retried: bool,
}

impl RetryState {
    /// Creates the state for the first attempt of a call.
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            retries: 0,
            timeout: policy.timeout_for_attempt(1),
            has_retried: false,
        }
    }

    /// The number of retries scheduled so far.
    pub fn retries(&self) -> usize {
        self.retries
    }

    /// The 1-indexed number of the current attempt.
    pub fn attempt(&self) -> usize {
        self.retries + 1
    }

    /// The timeout that applies to the current attempt.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether this call has been retried at least once. Never reset.
    pub fn has_retried(&self) -> bool {
        self.has_retried
    }

    /// Schedules the next retry and returns the backoff to wait before it.
    fn advance(&mut self, policy: &RetryPolicy) -> Duration {
        self.retries += 1;
        self.has_retried = true;
        self.timeout = policy.timeout_for_attempt(self.retries + 1);
        policy.backoff_delay(self.retries)
    }
}

/// Trait for determining whether a failed attempt should be retried.
///
/// The predicate only classifies; the attempt budget and the backoff schedule
/// always come from the [`RetryPolicy`].
///
/// # Examples
///
/// ```
/// use platform_client::{Error, RetryPredicate};
///
/// struct RetryOnBadGateway;
///
/// impl RetryPredicate for RetryOnBadGateway {
///     fn should_retry(&self, error: &Error, _attempt: usize) -> bool {
///         error.status().is_some_and(|s| s.as_u16() == 502)
///     }
/// }
/// ```
pub trait RetryPredicate: Send + Sync {
    /// Returns `true` if the attempt that failed with `error` should be retried.
    ///
    /// `attempt` is the 1-indexed number of the attempt that failed.
    fn should_retry(&self, error: &Error, attempt: usize) -> bool;
}

/// Retry transport timeouts and any 5xx response.
///
/// This is the default. It treats every 5xx as safe to repeat, so wrapped
/// operations are assumed to be idempotent on the upstream side.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryOnTransient;

impl RetryPredicate for RetryOnTransient {
    fn should_retry(&self, error: &Error, _attempt: usize) -> bool {
        error.is_retryable()
    }
}

/// Retry only on 5xx server errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryOn5xx;

impl RetryPredicate for RetryOn5xx {
    fn should_retry(&self, error: &Error, _attempt: usize) -> bool {
        matches!(error, Error::UpstreamServerError { .. })
    }
}

/// Retry only on transport timeouts.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnTimeout;

impl RetryPredicate for RetryOnTimeout {
    fn should_retry(&self, error: &Error, _attempt: usize) -> bool {
        matches!(error, Error::TransportTimeout { .. })
    }
}

/// Drives one logical call through `attempt` until it reaches an outcome.
///
/// * A success is returned as soon as any attempt produces one.
/// * A failure the predicate rejects is returned unchanged.
/// * A retryable failure schedules another attempt after the policy's backoff,
///   with the next attempt's timeout carried in the [`RetryState`].
/// * Once `max_retries` retries have been spent, the final failure is returned
///   wrapped in [`Error::RetriesExhausted`].
///
/// When `already_retried` is set the call was retried by some other mechanism
/// and gets exactly one attempt.
///
/// The backoff is a `tokio` sleep, so only the current call is suspended.
/// Dropping the returned future abandons any pending retry.
///
/// # Examples
///
/// ```
/// use platform_client::{retry::with_retry, Error, RetryOnTransient, RetryPolicy};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Error> {
/// let policy = RetryPolicy::new(2, Duration::from_secs(5));
/// let value = with_retry(&policy, &RetryOnTransient, false, |state| async move {
///     Ok::<_, Error>(state.attempt())
/// })
/// .await?;
/// assert_eq!(value, 1);
/// # Ok(())
/// # }
/// ```
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    predicate: &dyn RetryPredicate,
    already_retried: bool,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut(RetryState) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut state = RetryState::new(policy);

    loop {
        let error = match attempt(state).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if already_retried || !predicate.should_retry(&error, state.attempt()) {
            return Err(error);
        }

        if state.retries() >= policy.max_retries {
            return Err(Error::RetriesExhausted {
                attempts: state.attempt(),
                last_error: Box::new(error),
            });
        }

        let delay = state.advance(policy);
        tracing::info!(
            delay_ms = delay.as_millis() as u64,
            retry = state.retries(),
            max_retries = policy.max_retries,
            next_timeout_ms = state.timeout().as_millis() as u64,
            "Retrying request after delay"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use http::{HeaderMap, StatusCode};
    use std::collections::VecDeque;
    use tokio::time::Instant;

    fn upstream(code: u16) -> Error {
        Error::from_status(
            StatusCode::from_u16(code).unwrap(),
            format!("status {}", code),
            HeaderMap::new(),
        )
    }

    fn timeout(state: RetryState) -> Error {
        Error::TransportTimeout {
            timeout: state.timeout(),
        }
    }

    enum Step {
        Status(u16),
        Timeout,
        Ok,
    }

    /// Records the state and start time of every attempt.
    #[derive(Default)]
    struct Recorder {
        attempts: Vec<(RetryState, Instant)>,
    }

    impl Recorder {
        fn gaps(&self) -> Vec<Duration> {
            self.attempts
                .windows(2)
                .map(|pair| pair[1].1 - pair[0].1)
                .collect()
        }

        fn timeouts(&self) -> Vec<Duration> {
            self.attempts.iter().map(|(state, _)| state.timeout()).collect()
        }
    }

    fn assert_close(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(10),
            "expected ~{:?}, got {:?}",
            expected,
            actual
        );
    }

    #[test]
    fn test_policy_schedule() {
        let policy = RetryPolicy::new(3, Duration::from_secs(60));

        assert_eq!(policy.timeout_for_attempt(1), Duration::from_secs(60));
        assert_eq!(policy.timeout_for_attempt(2), Duration::from_secs(120));
        assert_eq!(policy.timeout_for_attempt(4), Duration::from_secs(240));

        assert_eq!(policy.backoff_delay(1), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(8));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(16));
    }

    #[test]
    fn test_backoff_unit_scales_schedule() {
        let policy =
            RetryPolicy::new(3, Duration::from_secs(1)).with_backoff_unit(Duration::from_millis(1));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(4));
        assert_eq!(policy.backoff_delay(usize::MAX), Duration::from_millis(1 << 31));
    }

    #[test]
    fn test_base_timeout_override() {
        let policy = RetryPolicy::new(3, Duration::from_secs(60));
        assert_eq!(policy.with_base_timeout(None), policy);
        let overridden = policy.with_base_timeout(Some(Duration::from_secs(5)));
        assert_eq!(overridden.timeout_for_attempt(3), Duration::from_secs(15));
    }

    #[test]
    fn test_state_advances_linearly() {
        let policy = RetryPolicy::new(3, Duration::from_secs(60));
        let mut state = RetryState::new(&policy);
        assert_eq!(state.attempt(), 1);
        assert_eq!(state.timeout(), Duration::from_secs(60));
        assert!(!state.has_retried());

        assert_eq!(state.advance(&policy), Duration::from_secs(4));
        assert_eq!(state.attempt(), 2);
        assert_eq!(state.timeout(), Duration::from_secs(120));
        assert!(state.has_retried());

        assert_eq!(state.advance(&policy), Duration::from_secs(8));
        assert_eq!(state.timeout(), Duration::from_secs(180));
        assert!(state.has_retried());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_failures_then_success() {
        let policy = RetryPolicy::new(3, Duration::from_secs(60));
        let mut recorder = Recorder::default();
        let mut script = VecDeque::from(vec![
            Step::Status(503),
            Step::Timeout,
            Step::Status(502),
            Step::Ok,
        ]);

        let result = with_retry(&policy, &RetryOnTransient, false, |state| {
            recorder.attempts.push((state, Instant::now()));
            let outcome = match script.pop_front().expect("script exhausted") {
                Step::Status(code) => Err(upstream(code)),
                Step::Timeout => Err(timeout(state)),
                Step::Ok => Ok(200),
            };
            async move { outcome }
        })
        .await;

        assert_eq!(result.unwrap(), 200);
        assert_eq!(recorder.attempts.len(), 4);

        let gaps = recorder.gaps();
        assert_close(gaps[0], Duration::from_secs(4));
        assert_close(gaps[1], Duration::from_secs(8));
        assert_close(gaps[2], Duration::from_secs(16));

        assert_eq!(
            recorder.timeouts(),
            vec![
                Duration::from_secs(60),
                Duration::from_secs(120),
                Duration::from_secs(180),
                Duration::from_secs(240),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_exhaust_budget() {
        let policy = RetryPolicy::new(3, Duration::from_secs(60));
        let mut recorder = Recorder::default();

        let result: Result<()> = with_retry(&policy, &RetryOnTransient, false, |state| {
            recorder.attempts.push((state, Instant::now()));
            async move { Err(timeout(state)) }
        })
        .await;

        assert_eq!(recorder.attempts.len(), 4);
        match result {
            Err(Error::RetriesExhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 4);
                match *last_error {
                    Error::TransportTimeout { timeout } => {
                        assert_eq!(timeout, Duration::from_secs(240))
                    }
                    other => panic!("Expected TransportTimeout, got {:?}", other),
                }
            }
            other => panic!("Expected RetriesExhausted, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_not_retried() {
        let policy = RetryPolicy::new(3, Duration::from_secs(60));
        let mut calls = 0;

        let result: Result<()> = with_retry(&policy, &RetryOnTransient, false, |_| {
            calls += 1;
            async { Err(upstream(404)) }
        })
        .await;

        assert_eq!(calls, 1);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamClientError);
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_retried_gets_single_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_secs(60));
        let mut calls = 0;

        let result: Result<()> = with_retry(&policy, &RetryOnTransient, true, |_| {
            calls += 1;
            async { Err(upstream(503)) }
        })
        .await;

        assert_eq!(calls, 1);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::UpstreamServerError);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries() {
        let policy = RetryPolicy::new(0, Duration::from_secs(60));
        let mut calls = 0;

        let result: Result<()> = with_retry(&policy, &RetryOnTransient, false, |_| {
            calls += 1;
            async { Err(upstream(500)) }
        })
        .await;

        assert_eq!(calls, 1);
        assert!(matches!(
            result,
            Err(Error::RetriesExhausted { attempts: 1, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_narrows_classification() {
        let policy = RetryPolicy::new(3, Duration::from_secs(60));
        let mut calls = 0;

        let result: Result<()> = with_retry(&policy, &RetryOn5xx, false, |state| {
            calls += 1;
            async move { Err(timeout(state)) }
        })
        .await;

        assert_eq!(calls, 1);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::TransportTimeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_abandons_pending_retries() {
        let policy = RetryPolicy::new(3, Duration::from_secs(60));
        let mut calls = 0;

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            with_retry(&policy, &RetryOnTransient, false, |_| {
                calls += 1;
                async { Err::<(), _>(upstream(503)) }
            }),
        )
        .await;

        assert!(outcome.is_err());
        // t=0 first attempt, t=4s second attempt, cancelled during the 8s backoff.
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_predicates() {
        let timeout_err = Error::TransportTimeout {
            timeout: Duration::from_secs(1),
        };
        assert!(RetryOnTransient.should_retry(&timeout_err, 1));
        assert!(RetryOnTimeout.should_retry(&timeout_err, 1));
        assert!(!RetryOn5xx.should_retry(&timeout_err, 1));

        assert!(RetryOnTransient.should_retry(&upstream(500), 1));
        assert!(RetryOn5xx.should_retry(&upstream(500), 1));
        assert!(!RetryOnTimeout.should_retry(&upstream(500), 1));

        assert!(!RetryOnTransient.should_retry(&upstream(429), 1));
    }
}
