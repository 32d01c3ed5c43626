//! Alibaba Cloud provider error types

use stratus_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AliyunError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("No endpoint known for product {product} in region {region}")]
    UnknownEndpoint { product: String, region: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response to {action} (HTTP {status}): {body}")]
    InvalidResponse {
        action: String,
        status: u16,
        body: String,
    },

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Cloud error: {0}")]
    CloudError(#[from] CloudError),
}

impl From<AliyunError> for CloudError {
    fn from(err: AliyunError) -> Self {
        match err {
            AliyunError::CloudError(inner) => inner,
            AliyunError::Http(e) => CloudError::Transport(e.to_string()),
            AliyunError::InvalidResponse {
                action,
                status,
                body,
            } => CloudError::malformed(action, "$", format!("HTTP {status}: {body}")),
            AliyunError::JsonError(e) => CloudError::Json(e),
            other => CloudError::InvalidConfig(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AliyunError>;
