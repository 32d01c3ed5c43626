//! Shared constants and response helpers

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::time::Duration;
use stratus_cloud::{Api, CloudError, Result, RetryPolicy};

pub const DTS: Api = Api::new("Dts", "2020-01-01");
pub const RDS: Api = Api::new("Rds", "2014-08-15");

pub const DEFAULT_TIMEOUT_MEDIUM: Duration = Duration::from_secs(500);
pub const DEFAULT_INTERVAL_SHORT: Duration = Duration::from_secs(5);

/// Bound for describe calls issued on their own.
pub const DESCRIBE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// 3s initial delay growing by 3s, bounded by `timeout`.
pub fn mutate_policy(timeout: Duration) -> RetryPolicy {
    RetryPolicy::new(timeout).with_backoff(Duration::from_secs(3), Duration::from_secs(3))
}

/// Some actions report failure in a 200 body with `"Success": false`.
pub fn ensure_success(action: &str, id: &str, response: &Value) -> Result<()> {
    let failed = match response.get("Success") {
        Some(Value::Bool(ok)) => !ok,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("false"),
        _ => false,
    };
    if !failed {
        return Ok(());
    }

    let text = |key: &str| response.get(key).and_then(Value::as_str).map(str::to_string);
    Err(CloudError::Api {
        code: text("ErrCode")
            .or_else(|| text("Code"))
            .unwrap_or_else(|| "Success.False".to_string()),
        message: text("ErrMessage")
            .or_else(|| text("Message"))
            .unwrap_or_else(|| response.to_string()),
        request_id: text("RequestId"),
        http_status: None,
    }
    .annotate(action, id))
}

/// Decode a typed snapshot, reporting shape mismatches as malformed.
pub fn decode<T: serde::de::DeserializeOwned>(id: &str, path: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| CloudError::malformed(id, path, e))
}

/// Follow a `$.A.B` style path into a response.
pub fn pointer<'a>(id: &str, response: &'a Value, path: &[&str]) -> Result<&'a Value> {
    path.iter().try_fold(response, |v, key| {
        v.get(key).ok_or_else(|| {
            CloudError::malformed(id, format!("$.{}", path.join(".")), format!("missing {key}"))
        })
    })
}

/// Strings, numbers and booleans all read as an optional string.
pub fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

/// `true`, `"true"`, `1` and `"1"` are all true.
pub fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<bool>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::String(s)) => Some(s.eq_ignore_ascii_case("true") || s == "1"),
        Some(Value::Number(n)) => Some(n.as_i64() == Some(1)),
        _ => None,
    })
}

pub fn lenient_u32<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<u32>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ensure_success() {
        assert!(ensure_success("ModifyDtsJobName", "j", &json!({"Success": true})).is_ok());
        assert!(ensure_success("ModifyDtsJobName", "j", &json!({"RequestId": "r"})).is_ok());

        let err = ensure_success(
            "ModifyDtsJobName",
            "dtsjob-1",
            &json!({"Success": "false", "ErrCode": "InvalidJobName", "ErrMessage": "bad"}),
        )
        .unwrap_err();
        assert_eq!(err.code(), Some("InvalidJobName"));
        assert!(err.to_string().starts_with("ModifyDtsJobName failed for dtsjob-1"));
    }

    #[test]
    fn test_pointer() {
        let body = json!({"Items": {"DBInstanceAttribute": []}});
        assert!(pointer("rm-1", &body, &["Items", "DBInstanceAttribute"]).is_ok());

        let err = pointer("rm-1", &body, &["Databases", "Database"]).unwrap_err();
        assert!(matches!(err, CloudError::MalformedResponse { .. }));
    }

    #[test]
    fn test_lenient_fields() {
        #[derive(Deserialize)]
        struct Probe {
            #[serde(default, deserialize_with = "lenient_string")]
            port: Option<String>,
            #[serde(default, deserialize_with = "lenient_bool")]
            flag: Option<bool>,
            #[serde(default, deserialize_with = "lenient_u32")]
            days: Option<u32>,
        }

        let p: Probe = serde_json::from_value(json!({"port": 3306, "flag": "True", "days": "7"}))
            .unwrap();
        assert_eq!(p.port.as_deref(), Some("3306"));
        assert_eq!(p.flag, Some(true));
        assert_eq!(p.days, Some(7));

        let p: Probe = serde_json::from_value(json!({})).unwrap();
        assert!(p.port.is_none() && p.flag.is_none() && p.days.is_none());
    }
}
