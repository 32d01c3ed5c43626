pub mod error;
pub mod profile;

pub use error::*;
pub use profile::{Profile, TimeoutConfig, config_file_path, load_profile};

use std::path::{Path, PathBuf};

const ENV_MANIFEST: &str = "STRATUS_MANIFEST";
const MANIFEST_CANDIDATES: [&str; 4] = [
    "stratus.local.yaml",
    ".stratus.local.yaml",
    "stratus.yaml",
    ".stratus.yaml",
];

/// Stratus config directory, created on first use
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("stratus");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Locate the project manifest.
///
/// Search order:
/// 1. `STRATUS_MANIFEST` (direct path)
/// 2. current directory: stratus.local.yaml, .stratus.local.yaml, stratus.yaml, .stratus.yaml
/// 3. the same names inside `./.stratus/`
pub fn find_manifest_file() -> Result<PathBuf> {
    if let Ok(manifest) = std::env::var(ENV_MANIFEST) {
        let path = PathBuf::from(manifest);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;
    if let Some(path) = first_candidate(&current_dir) {
        return Ok(path);
    }

    let stratus_dir = current_dir.join(".stratus");
    if stratus_dir.is_dir()
        && let Some(path) = first_candidate(&stratus_dir)
    {
        return Ok(path);
    }

    Err(ConfigError::ManifestNotFound)
}

fn first_candidate(dir: &Path) -> Option<PathBuf> {
    MANIFEST_CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    /// Run `f` with the cwd set to `dir` and no manifest override.
    fn in_dir<T>(dir: &Path, f: impl FnOnce() -> T) -> T {
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir).unwrap();
        let out = temp_env::with_var_unset(ENV_MANIFEST, f);
        std::env::set_current_dir(original).unwrap();
        out
    }

    #[test]
    fn test_get_config_dir() {
        let config_dir = get_config_dir().unwrap();
        assert!(config_dir.ends_with("stratus"));
        assert!(config_dir.exists());
    }

    #[test]
    #[serial]
    fn test_find_manifest_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("stratus.yaml"), "resources: []").unwrap();

        let found = in_dir(temp_dir.path(), find_manifest_file).unwrap();
        assert!(found.ends_with("stratus.yaml"));
    }

    #[test]
    #[serial]
    fn test_local_manifest_wins() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("stratus.yaml"), "resources: []").unwrap();
        fs::write(temp_dir.path().join(".stratus.local.yaml"), "resources: []").unwrap();

        let found = in_dir(temp_dir.path(), find_manifest_file).unwrap();
        assert!(found.ends_with(".stratus.local.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_manifest_in_stratus_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let stratus_dir = temp_dir.path().join(".stratus");
        fs::create_dir(&stratus_dir).unwrap();
        fs::write(stratus_dir.join("stratus.yaml"), "resources: []").unwrap();

        let found = in_dir(temp_dir.path(), find_manifest_file).unwrap();
        assert!(found.ends_with(".stratus/stratus.yaml"));
    }

    #[test]
    #[serial]
    fn test_manifest_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let manifest = temp_dir.path().join("custom.yaml");
        fs::write(&manifest, "resources: []").unwrap();

        let found = temp_env::with_var(ENV_MANIFEST, manifest.to_str(), find_manifest_file).unwrap();
        assert_eq!(found, manifest);
    }

    #[test]
    #[serial]
    fn test_manifest_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();

        let result = in_dir(temp_dir.path(), find_manifest_file);
        assert!(matches!(result, Err(ConfigError::ManifestNotFound)));
    }
}
