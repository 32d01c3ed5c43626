//! Credential profiles
//!
//! `~/.config/stratus/config.yaml` holds named profiles:
//!
//! ```yaml
//! default_profile: dev
//! profiles:
//!   dev:
//!     region_id: cn-hangzhou
//!     access_key_id: LTAI...
//!     access_key_secret: ...
//!     timeouts:
//!       create: 1800
//! ```
//!
//! Environment variables take precedence over the file.

use crate::error::{ConfigError, Result};
use crate::get_config_dir;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_REGION: &str = "cn-hangzhou";
pub const DEFAULT_PROFILE: &str = "default";

const ENV_CONFIG_PATH: &str = "STRATUS_CONFIG_PATH";
const ENV_ACCESS_KEY_ID: &str = "ALIBABA_CLOUD_ACCESS_KEY_ID";
const ENV_ACCESS_KEY_SECRET: &str = "ALIBABA_CLOUD_ACCESS_KEY_SECRET";
const ENV_SECURITY_TOKEN: &str = "ALIBABA_CLOUD_SECURITY_TOKEN";
const ENV_REGION_ID: &str = "ALIBABA_CLOUD_REGION_ID";

/// Operation timeouts in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub create: u64,
    pub update: u64,
    pub delete: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            create: 20 * 60,
            update: 10 * 60,
            delete: 20 * 60,
        }
    }
}

impl TimeoutConfig {
    pub fn create(&self) -> Duration {
        Duration::from_secs(self.create)
    }

    pub fn update(&self) -> Duration {
        Duration::from_secs(self.update)
    }

    pub fn delete(&self) -> Duration {
        Duration::from_secs(self.delete)
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub region_id: String,
    pub access_key_id: Option<String>,
    pub access_key_secret: Option<String>,
    pub security_token: Option<String>,
    pub source_ip: Option<String>,
    /// Per-product host overrides, e.g. `Rds: rds-vpc.cn-hangzhou.aliyuncs.com`
    pub endpoints: BTreeMap<String, String>,
    pub timeouts: TimeoutConfig,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            region_id: DEFAULT_REGION.to_string(),
            access_key_id: None,
            access_key_secret: None,
            security_token: None,
            source_ip: None,
            endpoints: BTreeMap::new(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl std::fmt::Debug for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profile")
            .field("region_id", &self.region_id)
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &self.access_key_secret.as_ref().map(|_| "******"))
            .field("security_token", &self.security_token.as_ref().map(|_| "******"))
            .field("source_ip", &self.source_ip)
            .field("endpoints", &self.endpoints)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl Profile {
    /// Access key pair, or an error naming what is missing.
    pub fn credentials(&self) -> Result<(&str, &str)> {
        match (
            self.access_key_id.as_deref().filter(|s| !s.is_empty()),
            self.access_key_secret.as_deref().filter(|s| !s.is_empty()),
        ) {
            (Some(id), Some(secret)) => Ok((id, secret)),
            (None, _) => Err(ConfigError::MissingCredentials(format!(
                "access_key_id is not set (profile or {ENV_ACCESS_KEY_ID})"
            ))),
            (_, None) => Err(ConfigError::MissingCredentials(format!(
                "access_key_secret is not set (profile or {ENV_ACCESS_KEY_SECRET})"
            ))),
        }
    }

    fn apply_env(&mut self) {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        if let Some(id) = var(ENV_ACCESS_KEY_ID) {
            self.access_key_id = Some(id);
        }
        if let Some(secret) = var(ENV_ACCESS_KEY_SECRET) {
            self.access_key_secret = Some(secret);
        }
        if let Some(token) = var(ENV_SECURITY_TOKEN) {
            self.security_token = Some(token);
        }
        if let Some(region) = var(ENV_REGION_ID) {
            self.region_id = region;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    default_profile: Option<String>,
    profiles: BTreeMap<String, Profile>,
}

/// `STRATUS_CONFIG_PATH`, else `~/.config/stratus/config.yaml`.
pub fn config_file_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
        return Ok(PathBuf::from(path));
    }
    Ok(get_config_dir()?.join("config.yaml"))
}

/// Load the named profile, or the file's default, with environment
/// overrides applied.
///
/// Without a config file the profile comes from the environment alone;
/// asking for a specific name then fails.
pub fn load_profile(name: Option<&str>) -> Result<Profile> {
    let path = config_file_path()?;

    let mut profile = if path.exists() {
        let content = std::fs::read_to_string(&path)?;
        let file: ConfigFile =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        let wanted = name
            .map(str::to_string)
            .or(file.default_profile.clone())
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string());

        match file.profiles.get(&wanted) {
            Some(profile) => profile.clone(),
            None if name.is_some() || file.default_profile.is_some() => {
                return Err(ConfigError::ProfileNotFound(
                    wanted,
                    path.display().to_string(),
                ));
            }
            None => Profile::default(),
        }
    } else if let Some(name) = name {
        return Err(ConfigError::ProfileNotFound(
            name.to_string(),
            path.display().to_string(),
        ));
    } else {
        Profile::default()
    };

    profile.apply_env();
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    const SAMPLE: &str = r#"
default_profile: dev
profiles:
  dev:
    region_id: cn-shanghai
    access_key_id: dev-id
    access_key_secret: dev-secret
    endpoints:
      Rds: rds-vpc.cn-shanghai.aliyuncs.com
    timeouts:
      create: 1800
  prod:
    region_id: cn-beijing
    access_key_id: prod-id
    access_key_secret: prod-secret
"#;

    /// Every credential variable unset, then `overrides` applied.
    fn env<'a>(overrides: &[(&'static str, Option<&'a str>)]) -> Vec<(&'static str, Option<&'a str>)> {
        let mut vars: Vec<(&'static str, Option<&'a str>)> = [
            ENV_ACCESS_KEY_ID,
            ENV_ACCESS_KEY_SECRET,
            ENV_SECURITY_TOKEN,
            ENV_REGION_ID,
        ]
        .into_iter()
        .map(|key| (key, None))
        .collect();
        for &(key, value) in overrides {
            match vars.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => vars.push((key, value)),
            }
        }
        vars
    }

    #[test]
    #[serial]
    fn test_default_profile_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, SAMPLE).unwrap();

        let vars = env(&[(ENV_CONFIG_PATH, path.to_str())]);
        let profile = temp_env::with_vars(vars, || load_profile(None)).unwrap();

        assert_eq!(profile.region_id, "cn-shanghai");
        assert_eq!(profile.credentials().unwrap(), ("dev-id", "dev-secret"));
        assert_eq!(profile.endpoints["Rds"], "rds-vpc.cn-shanghai.aliyuncs.com");
        assert_eq!(profile.timeouts.create(), Duration::from_secs(1800));
        assert_eq!(profile.timeouts.update(), Duration::from_secs(600));
    }

    #[test]
    #[serial]
    fn test_named_profile_and_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, SAMPLE).unwrap();

        let vars = env(&[
            (ENV_CONFIG_PATH, path.to_str()),
            (ENV_REGION_ID, Some("ap-southeast-1")),
            (ENV_SECURITY_TOKEN, Some("sts")),
        ]);
        let profile = temp_env::with_vars(vars, || load_profile(Some("prod"))).unwrap();

        assert_eq!(profile.region_id, "ap-southeast-1");
        assert_eq!(profile.access_key_id.as_deref(), Some("prod-id"));
        assert_eq!(profile.security_token.as_deref(), Some("sts"));
    }

    #[test]
    #[serial]
    fn test_unknown_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, SAMPLE).unwrap();

        let vars = env(&[(ENV_CONFIG_PATH, path.to_str())]);
        let err = temp_env::with_vars(vars, || load_profile(Some("staging"))).unwrap_err();
        assert!(matches!(err, ConfigError::ProfileNotFound(name, _) if name == "staging"));
    }

    #[test]
    #[serial]
    fn test_environment_only() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");

        let vars = env(&[
            (ENV_CONFIG_PATH, missing.to_str()),
            (ENV_ACCESS_KEY_ID, Some("env-id")),
            (ENV_ACCESS_KEY_SECRET, Some("env-secret")),
        ]);
        let profile = temp_env::with_vars(vars, || load_profile(None)).unwrap();

        assert_eq!(profile.region_id, DEFAULT_REGION);
        assert_eq!(profile.credentials().unwrap(), ("env-id", "env-secret"));
        assert_eq!(profile.timeouts, TimeoutConfig::default());
    }

    #[test]
    #[serial]
    fn test_missing_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");

        let vars = env(&[(ENV_CONFIG_PATH, missing.to_str())]);
        let profile = temp_env::with_vars(vars, || load_profile(None)).unwrap();

        let err = profile.credentials().unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredentials(_)));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let profile = Profile {
            access_key_id: Some("id".into()),
            access_key_secret: Some("hunter2".into()),
            ..Default::default()
        };
        let shown = format!("{profile:?}");
        assert!(shown.contains("id"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    #[serial]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "profiles: [not, a, map]").unwrap();

        let vars = env(&[(ENV_CONFIG_PATH, path.to_str())]);
        let err = temp_env::with_vars(vars, || load_profile(None)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
