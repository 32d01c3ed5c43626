//! Shared call context and the invoke interface
//!
//! Handlers never talk HTTP. They build a [`Request`] against a [`Context`],
//! and the context's [`Transport`] does the signing and sending. Tests swap
//! the transport for a scripted one.

use crate::classify::Classifier;
use crate::error::Result;
use crate::retry::{Operation, RetryPolicy, retry};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Request parameters, flattened the way RPC-style APIs expect them.
pub type Params = serde_json::Map<String, Value>;

/// A vendor product and the API version its actions belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Api {
    pub product: &'static str,
    pub version: &'static str,
}

impl Api {
    pub const fn new(product: &'static str, version: &'static str) -> Self {
        Self { product, version }
    }
}

/// Sends one action and returns the decoded response body.
///
/// Vendor error bodies must come back as [`crate::CloudError::Api`] so the
/// classifier can read their codes.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, api: Api, action: &str, params: &Params) -> Result<Value>;
}

/// Region, caller identity and transport shared by every handler call.
#[derive(Clone)]
pub struct Context {
    pub region_id: String,
    pub source_ip: Option<String>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("region_id", &self.region_id)
            .field("source_ip", &self.source_ip)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn new(region_id: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            region_id: region_id.into(),
            source_ip: None,
            transport,
        }
    }

    pub fn with_source_ip(mut self, source_ip: impl Into<String>) -> Self {
        self.source_ip = Some(source_ip.into());
        self
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn request<'a>(&'a self, api: Api, action: &'a str) -> Request<'a> {
        Request {
            ctx: self,
            api,
            action,
            id: "",
            params: Params::new(),
            classifier: Classifier::default(),
            policy: RetryPolicy::default(),
        }
    }
}

/// One mutating or reading call, retried under its own policy.
pub struct Request<'a> {
    ctx: &'a Context,
    api: Api,
    action: &'a str,
    id: &'a str,
    params: Params,
    classifier: Classifier,
    policy: RetryPolicy,
}

impl<'a> Request<'a> {
    /// Entity the call is about; used in error annotations and logs.
    pub fn id(mut self, id: &'a str) -> Self {
        self.id = id;
        self
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Set `key` only when a value is present.
    pub fn param_opt<V: Into<Value>>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.param(key, v),
            None => self,
        }
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params.extend(params);
        self
    }

    pub fn with_region(self) -> Self {
        let region = self.ctx.region_id.clone();
        self.param("RegionId", region)
    }

    pub fn with_source_ip(self) -> Self {
        let ip = self.ctx.source_ip.clone();
        self.param_opt("SourceIp", ip)
    }

    /// Vendor codes that are retried at this call site.
    pub fn expect(mut self, codes: &[&str]) -> Self {
        self.classifier = Classifier::new(codes.iter().copied());
        self
    }

    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.policy = self.policy.with_timeout(timeout);
        self
    }

    pub async fn send(self) -> Result<Value> {
        let Request {
            ctx,
            api,
            action,
            id,
            params,
            classifier,
            policy,
        } = self;

        tracing::debug!(
            product = api.product,
            action,
            id,
            params = %redacted(&params),
            "request"
        );

        let response = retry(Operation::new(action, id), &policy, &classifier, || {
            ctx.transport.call(api, action, &params)
        })
        .await?;

        tracing::debug!(product = api.product, action, id, response = %response, "response");
        Ok(response)
    }
}

/// Render params for logging with secrets masked.
fn redacted(params: &Params) -> Value {
    Value::Object(
        params
            .iter()
            .map(|(k, v)| {
                if k.contains("Password") || k.contains("Secret") {
                    (k.clone(), Value::String("******".to_string()))
                } else {
                    (k.clone(), v.clone())
                }
            })
            .collect(),
    )
}
