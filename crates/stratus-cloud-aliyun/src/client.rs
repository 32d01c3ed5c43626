//! Alibaba Cloud RPC API client
//!
//! Implements the signature version 1.0 scheme used by the RPC-style
//! products (RDS, DTS): every parameter, common ones included, is sorted,
//! percent-encoded per RFC 3986 and signed with HMAC-SHA1 over
//! `POST&%2F&<encoded query>` using `<secret>&` as key.

use crate::error::{AliyunError, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha1::Sha1;
use std::collections::{BTreeMap, HashMap};
use stratus_cloud::{Api, CloudError, Params, Transport};

type HmacSha1 = Hmac<Sha1>;

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const SIGNATURE_VERSION: &str = "1.0";

/// Access key pair, optionally with an STS token.
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub access_key_secret: String,
    pub security_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("security_token", &self.security_token.as_ref().map(|_| "******"))
            .finish_non_exhaustive()
    }
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
            security_token: None,
        }
    }

    pub fn with_security_token(mut self, token: impl Into<String>) -> Self {
        self.security_token = Some(token.into());
        self
    }
}

/// Signed HTTPS transport for RPC-style APIs
pub struct RpcClient {
    http: reqwest::Client,
    credentials: Credentials,
    region_id: String,
    endpoints: HashMap<String, String>,
}

impl RpcClient {
    pub fn new(credentials: Credentials, region_id: impl Into<String>) -> Result<Self> {
        if credentials.access_key_id.is_empty() || credentials.access_key_secret.is_empty() {
            return Err(AliyunError::MissingCredentials(
                "access key id and secret are required".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("stratus/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            credentials,
            region_id: region_id.into(),
            endpoints: HashMap::new(),
        })
    }

    /// Override the host used for `product` (e.g. a VPC endpoint).
    pub fn with_endpoint(mut self, product: impl Into<String>, host: impl Into<String>) -> Self {
        self.endpoints.insert(product.into(), host.into());
        self
    }

    pub fn endpoint(&self, product: &str) -> Result<String> {
        if let Some(host) = self.endpoints.get(product) {
            return Ok(host.clone());
        }
        match product {
            "Rds" => Ok("rds.aliyuncs.com".to_string()),
            "Dts" => Ok(format!("dts.{}.aliyuncs.com", self.region_id)),
            _ => Err(AliyunError::UnknownEndpoint {
                product: product.to_string(),
                region: self.region_id.clone(),
            }),
        }
    }

    /// Common parameters plus the action's own, signed.
    fn signed_query(
        &self,
        api: Api,
        action: &str,
        params: &Params,
        timestamp: &str,
        nonce: &str,
    ) -> Result<BTreeMap<String, String>> {
        let mut query: BTreeMap<String, String> = params
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), param_value(v)))
            .collect();

        query.insert("Action".into(), action.to_string());
        query.insert("Format".into(), "JSON".into());
        query.insert("Version".into(), api.version.to_string());
        query.insert("AccessKeyId".into(), self.credentials.access_key_id.clone());
        query.insert("SignatureMethod".into(), SIGNATURE_METHOD.into());
        query.insert("SignatureVersion".into(), SIGNATURE_VERSION.into());
        query.insert("SignatureNonce".into(), nonce.to_string());
        query.insert("Timestamp".into(), timestamp.to_string());
        if let Some(token) = &self.credentials.security_token {
            query.insert("SecurityToken".into(), token.clone());
        }

        let signature = sign(
            &self.credentials.access_key_secret,
            &string_to_sign("POST", &query),
        )?;
        query.insert("Signature".into(), signature);
        Ok(query)
    }

    async fn post(&self, api: Api, action: &str, params: &Params) -> Result<Value> {
        let host = self.endpoint(api.product)?;
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let nonce = uuid::Uuid::new_v4().to_string();
        let query = self.signed_query(api, action, params, &timestamp, &nonce)?;

        let response = self
            .http
            .post(format!("https://{host}/"))
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(canonical_query(&query))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|_| AliyunError::InvalidResponse {
                action: action.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(err) => Err(CloudError::Api {
                code: err.code,
                message: err.message,
                request_id: err.request_id,
                http_status: Some(status.as_u16()),
            }
            .into()),
            Err(_) => Err(AliyunError::InvalidResponse {
                action: action.to_string(),
                status: status.as_u16(),
                body,
            }),
        }
    }
}

#[async_trait]
impl Transport for RpcClient {
    async fn call(&self, api: Api, action: &str, params: &Params) -> stratus_cloud::Result<Value> {
        Ok(self.post(api, action, params).await?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorBody {
    code: String,
    #[serde(default)]
    message: String,
    request_id: Option<String>,
}

/// Scalars go as-is; lists and maps as compact JSON.
fn param_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// RFC 3986 encoding: only unreserved characters pass through.
pub(crate) fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn canonical_query(query: &BTreeMap<String, String>) -> String {
    query
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn string_to_sign(method: &str, query: &BTreeMap<String, String>) -> String {
    format!(
        "{}&{}&{}",
        method,
        percent_encode("/"),
        percent_encode(&canonical_query(query))
    )
}

fn sign(secret: &str, string_to_sign: &str) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(format!("{secret}&").as_bytes())
        .map_err(|e| AliyunError::MissingCredentials(e.to_string()))?;
    mac.update(string_to_sign.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
