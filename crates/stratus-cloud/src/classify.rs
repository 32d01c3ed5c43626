//! Transient-error classification
//!
//! Every mutating call site declares which vendor codes it expects to clear
//! up on their own (an instance still busy with a previous task, a database
//! that is not visible yet). Those, plus a generic set of throttling and
//! availability failures, are worth another attempt. Everything else fails
//! the operation.

use crate::error::CloudError;

/// Codes returned while an RDS instance is still busy with another task.
pub const OPERATION_DENIED_DB_STATUS: &[&str] = &[
    "OperationDenied.DBStatus",
    "OperationDenied.DBInstanceStatus",
    "OperationDenied.DBClusterStatus",
    "InternalError",
    "OperationDenied.OutofUsage",
];

const TRANSIENT_CODES: &[&str] = &[
    "ServiceUnavailable",
    "Rejected.Throttling",
    "SystemBusy",
    "ServiceBusy",
    "OperationConflict",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    Fatal,
}

/// Per-call-site classifier.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    expected: Vec<String>,
}

impl Classifier {
    pub fn new<I, S>(expected: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            expected: expected.into_iter().map(Into::into).collect(),
        }
    }

    pub fn classify(&self, err: &CloudError) -> ErrorClass {
        if err.is_timeout() {
            return ErrorClass::Fatal;
        }
        let expected: Vec<&str> = self.expected.iter().map(String::as_str).collect();
        if is_expected_error(err, &expected) || needs_retry(err) {
            ErrorClass::Retryable
        } else {
            ErrorClass::Fatal
        }
    }

    pub fn is_retryable(&self, err: &CloudError) -> bool {
        self.classify(err) == ErrorClass::Retryable
    }
}

/// Generic transient failures: transport errors, 5xx and throttling codes.
pub fn needs_retry(err: &CloudError) -> bool {
    if err.is_timeout() {
        return false;
    }
    match err.root() {
        CloudError::Transport(_) => true,
        CloudError::Api {
            code, http_status, ..
        } => {
            if http_status.is_some_and(|s| (500..600).contains(&s)) {
                return true;
            }
            TRANSIENT_CODES.contains(&code.as_str()) || code.starts_with("Throttling")
        }
        _ => false,
    }
}

/// Whether the innermost vendor code is one of `codes`.
pub fn is_expected_error(err: &CloudError, codes: &[&str]) -> bool {
    err.has_code(codes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn api(code: &str, status: u16) -> CloudError {
        CloudError::Api {
            code: code.to_string(),
            message: String::new(),
            request_id: None,
            http_status: Some(status),
        }
    }

    #[test]
    fn test_throttling_is_transient() {
        assert!(needs_retry(&api("Throttling.User", 400)));
        assert!(needs_retry(&api("Throttling", 400)));
        assert!(needs_retry(&api("Rejected.Throttling", 400)));
        assert!(needs_retry(&api("ServiceUnavailable", 503)));
        assert!(needs_retry(&api("Whatever", 502)));
        assert!(needs_retry(&CloudError::Transport("connection reset".into())));
    }

    #[test]
    fn test_plain_client_errors_are_fatal() {
        let classifier = Classifier::default();
        assert_eq!(
            classifier.classify(&api("InvalidParameter", 400)),
            ErrorClass::Fatal
        );
        assert_eq!(
            classifier.classify(&CloudError::not_found("DBAccount", "rm-1:app")),
            ErrorClass::Fatal
        );
        assert_eq!(
            classifier.classify(&CloudError::InvalidId {
                id: "x".into(),
                expected: 2
            }),
            ErrorClass::Fatal
        );
        assert_eq!(
            classifier.classify(&CloudError::WaitTimeout {
                id: "x".into(),
                last_status: None,
                expected: vec![],
                timeout: Duration::from_secs(1),
            }),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn test_expected_codes_are_retryable() {
        let classifier = Classifier::new(OPERATION_DENIED_DB_STATUS.iter().copied());
        assert!(classifier.is_retryable(&api("OperationDenied.DBInstanceStatus", 403)));
        assert!(!classifier.is_retryable(&api("InvalidDB.NotFound", 404)));

        let classifier = Classifier::new(["InvalidDB.NotFound"]);
        assert!(classifier.is_retryable(&api("InvalidDB.NotFound", 404)));
    }

    #[test]
    fn test_exhausted_retry_is_not_retried_again() {
        let err = CloudError::RetryTimeout {
            timeout: Duration::from_secs(30),
            last: Box::new(api("Throttling.User", 400)),
        };
        assert!(!needs_retry(&err));
        assert!(!Classifier::new(["Throttling.User"]).is_retryable(&err));
    }

    #[test]
    fn test_classifies_innermost_cause() {
        let err = api("SQLExecuteError", 400).annotate("ConfigureDtsJob", "dtsjob-1");
        assert!(Classifier::new(["SQLExecuteError"]).is_retryable(&err));
        assert!(!Classifier::default().is_retryable(&err));
    }
}
