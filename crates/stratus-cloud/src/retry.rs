//! Bounded retry executor

use crate::classify::Classifier;
use crate::error::{CloudError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Backoff schedule for one call site.
///
/// The delay starts at `initial_delay` and grows linearly by `increment`
/// after every retryable failure, capped at `max_delay`. `timeout` bounds the
/// whole execution, attempts and sleeps included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub increment: Duration,
    pub max_delay: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, initial_delay: Duration, increment: Duration) -> Self {
        self.initial_delay = initial_delay;
        self.increment = increment;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    fn next_delay(&self, current: Duration) -> Duration {
        (current + self.increment).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(3),
            increment: Duration::from_secs(3),
            max_delay: Duration::from_secs(60),
            timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Name and entity of a retried call, used to annotate its final error.
#[derive(Debug, Clone, Copy)]
pub struct Operation<'a> {
    pub action: &'a str,
    pub id: &'a str,
}

impl<'a> Operation<'a> {
    pub fn new(action: &'a str, id: &'a str) -> Self {
        Self { action, id }
    }
}

/// Run `attempt` until it succeeds, fails fatally, or `policy.timeout` is spent.
///
/// Each attempt only gets the budget that is left, so a hung call cannot push
/// the executor past its deadline. Blindly retrying a create whose response
/// was lost may create a duplicate; callers that care must make the request
/// idempotent themselves.
pub async fn retry<T, F, Fut>(
    op: Operation<'_>,
    policy: &RetryPolicy,
    classifier: &Classifier,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let deadline = Instant::now() + policy.timeout;
    let mut delay = policy.initial_delay;
    let mut attempts: u32 = 0;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        attempts += 1;

        let err = match tokio::time::timeout(remaining, attempt()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => err,
            Err(_) => CloudError::Transport(format!(
                "{} did not complete within {:?}",
                op.action, policy.timeout
            )),
        };

        if !classifier.is_retryable(&err) {
            tracing::debug!(action = op.action, id = op.id, attempts, error = %err, "fatal error");
            return Err(err.annotate(op.action, op.id));
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            tracing::warn!(action = op.action, id = op.id, attempts, error = %err, "retry budget exhausted");
            return Err(CloudError::RetryTimeout {
                timeout: policy.timeout,
                last: Box::new(err),
            }
            .annotate(op.action, op.id));
        }

        let sleep = delay.min(remaining);
        tracing::debug!(
            action = op.action,
            id = op.id,
            attempts,
            delay = ?sleep,
            error = %err,
            "retrying after transient error"
        );
        tokio::time::sleep(sleep).await;
        delay = policy.next_delay(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn api(code: &str) -> CloudError {
        CloudError::Api {
            code: code.to_string(),
            message: "busy".to_string(),
            request_id: None,
            http_status: Some(400),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(Duration::from_secs(60));

        let counter = calls.clone();
        let value = retry(
            Operation::new("CreateAccount", "rm-1:app"),
            &policy,
            &Classifier::default(),
            || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(api("Throttling.User"))
                    } else {
                        Ok("done")
                    }
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(value, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_returns_without_sleeping() {
        let start = Instant::now();
        let err = retry(
            Operation::new("CreateDatabase", "rm-1:app"),
            &RetryPolicy::default(),
            &Classifier::new(["OperationDenied.DBInstanceStatus"]),
            || async { Err::<(), _>(api("InvalidDBName.Malformed")) },
        )
        .await
        .unwrap_err();

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(err.code(), Some("InvalidDBName.Malformed"));
        assert!(!err.is_timeout());
        assert!(err.to_string().starts_with("CreateDatabase failed for rm-1:app"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_exceeds_timeout() {
        let timeout = Duration::from_secs(10);
        let policy = RetryPolicy::new(timeout);
        let start = Instant::now();

        let err = retry(
            Operation::new("ModifyDtsJob", "dtsjob-1"),
            &policy,
            &Classifier::new(["InvalidJobStatus"]),
            || async { Err::<(), _>(api("InvalidJobStatus")) },
        )
        .await
        .unwrap_err();

        assert!(start.elapsed() <= timeout);
        assert!(err.is_timeout());
        assert_eq!(err.code(), Some("InvalidJobStatus"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_attempt_is_cut_at_deadline() {
        let timeout = Duration::from_secs(30);
        let start = Instant::now();

        let err = retry(
            Operation::new("DescribeDtsJobDetail", "dtsjob-1"),
            &RetryPolicy::new(timeout),
            &Classifier::default(),
            || async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<_, CloudError>(())
            },
        )
        .await
        .unwrap_err();

        assert_eq!(start.elapsed(), timeout);
        assert!(err.is_timeout());
    }

    #[test]
    fn test_linear_backoff_is_capped() {
        let policy = RetryPolicy::default()
            .with_backoff(Duration::from_secs(3), Duration::from_secs(3))
            .with_max_delay(Duration::from_secs(7));
        assert_eq!(
            policy.next_delay(Duration::from_secs(3)),
            Duration::from_secs(6)
        );
        assert_eq!(
            policy.next_delay(Duration::from_secs(6)),
            Duration::from_secs(7)
        );
    }
}
