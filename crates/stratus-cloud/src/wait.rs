//! Polling for asynchronous server-side state transitions
//!
//! A wait runs `Polling → Success | Failed | Timeout`. Only elapsed time
//! bounds it; there is no attempt count.

use crate::classify::needs_retry;
use crate::error::{CloudError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

/// A snapshot that carries a status string.
pub trait Stateful {
    fn status(&self) -> &str;
}

/// Read side of a resource. Absence must be reported as [`CloudError::NotFound`].
#[async_trait]
pub trait Describe<S>: Send + Sync {
    async fn describe(&self, id: &str) -> Result<S>;
}

/// Success and failure states of one wait site plus its timing.
#[derive(Debug, Clone)]
pub struct WaitSpec {
    pub targets: Vec<String>,
    pub failures: Vec<String>,
    pub interval: Duration,
    pub delay: Duration,
    pub timeout: Duration,
    /// Treat a vanished entity as success (deletion waits).
    pub accept_absent: bool,
    pub ignore_case: bool,
}

impl WaitSpec {
    pub fn new<I, S>(targets: I, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
            failures: Vec::new(),
            interval: Duration::from_secs(5),
            delay: Duration::ZERO,
            timeout,
            accept_absent: false,
            ignore_case: false,
        }
    }

    /// Wait until the entity is gone.
    pub fn deleted(timeout: Duration) -> Self {
        Self {
            accept_absent: true,
            ..Self::new(Vec::<String>::new(), timeout)
        }
    }

    pub fn failures<I, S>(mut self, failures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failures = failures.into_iter().map(Into::into).collect();
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn accept_absent(mut self) -> Self {
        self.accept_absent = true;
        self
    }

    pub fn ignore_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    fn matches(&self, set: &[String], status: &str) -> bool {
        set.iter().any(|s| {
            if self.ignore_case {
                s.eq_ignore_ascii_case(status)
            } else {
                s == status
            }
        })
    }
}

/// Poll `source` until `id` reaches one of `spec.targets`.
///
/// Returns `Ok(Some(snapshot))` on a target state and `Ok(None)` when the
/// entity is absent and `spec.accept_absent` is set. Failure states are
/// checked before targets.
pub async fn wait_for_state<S, D>(source: &D, id: &str, spec: &WaitSpec) -> Result<Option<S>>
where
    S: Stateful + Send,
    D: Describe<S> + ?Sized,
{
    let deadline = Instant::now() + spec.timeout;
    let mut last_status: Option<String> = None;

    if !spec.delay.is_zero() {
        tokio::time::sleep(spec.delay.min(spec.timeout)).await;
    }

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let polled = match tokio::time::timeout(remaining, source.describe(id)).await {
            Ok(result) => result,
            Err(_) => Err(CloudError::Transport(format!("describe of {id} timed out"))),
        };

        match polled {
            Ok(snapshot) => {
                let status = snapshot.status();
                if spec.matches(&spec.failures, status) {
                    return Err(CloudError::FailureState {
                        id: id.to_string(),
                        state: status.to_string(),
                    });
                }
                if spec.matches(&spec.targets, status) {
                    tracing::debug!(id, status, "reached target state");
                    return Ok(Some(snapshot));
                }
                if last_status.as_deref() != Some(status) {
                    tracing::debug!(id, status, targets = ?spec.targets, "waiting for state");
                    last_status = Some(status.to_string());
                }
            }
            Err(err) if err.is_not_found() => {
                if spec.accept_absent {
                    tracing::debug!(id, "entity is gone");
                    return Ok(None);
                }
                tracing::debug!(id, last_status = ?last_status, "entity not found while waiting");
            }
            Err(err) if needs_retry(&err) => {
                tracing::debug!(id, error = %err, "transient describe error while waiting");
            }
            Err(err) => return Err(err),
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            let mut expected = spec.targets.clone();
            if spec.accept_absent {
                expected.push("<absent>".to_string());
            }
            return Err(CloudError::WaitTimeout {
                id: id.to_string(),
                last_status,
                expected,
                timeout: spec.timeout,
            });
        }
        tokio::time::sleep(spec.interval.min(remaining)).await;
    }
}
