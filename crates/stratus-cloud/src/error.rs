//! Cloud convergence error types

use std::time::Duration;
use thiserror::Error;

/// Errors produced by lifecycle handlers and the convergence engine.
///
/// Layers wrap errors with [`CloudError::annotate`] instead of replacing
/// them, so the original kind is always reachable through [`CloudError::root`].
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    #[error("API error {code}: {message}{}", .request_id.as_deref().map(|r| format!(" (RequestId: {r})")).unwrap_or_default())]
    Api {
        code: String,
        message: String,
        request_id: Option<String>,
        http_status: Option<u16>,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{id} entered failure state {state}")]
    FailureState { id: String, state: String },

    #[error(
        "timed out after {timeout:?} waiting for {id}: last status {}, expected {}",
        .last_status.as_deref().unwrap_or("<none>"),
        .expected.join("|")
    )]
    WaitTimeout {
        id: String,
        last_status: Option<String>,
        expected: Vec<String>,
        timeout: Duration,
    },

    #[error("gave up after {timeout:?}: {last}")]
    RetryTimeout {
        timeout: Duration,
        last: Box<CloudError>,
    },

    #[error("invalid id {id:?}: expected {expected} parts separated by ':'")]
    InvalidId { id: String, expected: usize },

    #[error("no transition leads from {} to {to}", .from.as_deref().unwrap_or("any state"))]
    UnreachableState { from: Option<String>, to: String },

    #[error("malformed response for {id} at {path}: {reason}")]
    MalformedResponse {
        id: String,
        path: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{action} failed for {id}: {source}")]
    Operation {
        action: String,
        id: String,
        #[source]
        source: Box<CloudError>,
    },

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn malformed(
        id: impl Into<String>,
        path: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::MalformedResponse {
            id: id.into(),
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Wrap with the operation name and entity id. The kind is preserved.
    pub fn annotate(self, action: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Operation {
            action: action.into(),
            id: id.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, looking through annotations and retry timeouts.
    pub fn root(&self) -> &CloudError {
        match self {
            Self::Operation { source, .. } => source.root(),
            Self::RetryTimeout { last, .. } => last.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound { .. })
    }

    pub fn is_timeout(&self) -> bool {
        let mut current = self;
        loop {
            match current {
                Self::WaitTimeout { .. } | Self::RetryTimeout { .. } => return true,
                Self::Operation { source, .. } => current = source.as_ref(),
                _ => return false,
            }
        }
    }

    /// Vendor error code, if the root cause came back from the API.
    pub fn code(&self) -> Option<&str> {
        match self.root() {
            Self::Api { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    pub fn has_code(&self, codes: &[&str]) -> bool {
        self.code().is_some_and(|c| codes.contains(&c))
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
