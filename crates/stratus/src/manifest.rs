//! Project manifest
//!
//! ```yaml
//! resources:
//!   - name: orders-db
//!     type: db_database
//!     config:
//!       instance_id: rm-bp1abc
//!       name: orders
//!     timeouts:
//!       create: 600
//! ```

use anyhow::{Context as _, bail};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use stratus_config::TimeoutConfig;

#[derive(Debug, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default = "empty_object")]
    pub config: Value,
    /// Overrides the profile's timeouts for this resource
    pub timeouts: Option<TimeoutConfig>,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl Manifest {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let manifest = Self::parse(&content)
            .with_context(|| format!("invalid manifest {}", path.display()))?;
        Ok(manifest)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let manifest: Manifest = serde_yaml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for resource in &self.resources {
            if resource.name.trim().is_empty() {
                bail!("resource of type '{}' has an empty name", resource.resource_type);
            }
            if !seen.insert(resource.name.as_str()) {
                bail!("duplicate resource name '{}'", resource.name);
            }
            if !stratus_cloud_aliyun::RESOURCE_TYPES.contains(&resource.resource_type.as_str()) {
                bail!(
                    "unknown resource type '{}' for '{}' (supported: {})",
                    resource.resource_type,
                    resource.name,
                    stratus_cloud_aliyun::RESOURCE_TYPES.join(", ")
                );
            }
            if !resource.config.is_object() {
                bail!("config of '{}' must be a mapping", resource.name);
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ResourceSpec> {
        self.resources.iter().find(|r| r.name == name)
    }
}

/// Directory holding `.stratus/state.json` for a manifest.
///
/// A manifest found inside `./.stratus/` belongs to the directory above it.
pub fn project_root(manifest_path: &Path) -> PathBuf {
    let parent = manifest_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    match parent.file_name() {
        Some(name) if name == ".stratus" => parent
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| parent.to_path_buf()),
        _ => parent.to_path_buf(),
    }
}
