use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_manifest(&self, content: &str) {
        fs::write(self.root.path().join("stratus.yaml"), content).unwrap();
    }

    #[allow(dead_code)]
    pub fn write_state(&self, content: &str) {
        let dir = self.root.path().join(".stratus");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("state.json"), content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    /// `stratus` running in the project with no ambient credentials.
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("stratus").unwrap();
        cmd.current_dir(self.path())
            .env("STRATUS_CONFIG_PATH", self.missing_config())
            .env_remove("STRATUS_MANIFEST")
            .env_remove("STRATUS_PROFILE")
            .env_remove("ALIBABA_CLOUD_ACCESS_KEY_ID")
            .env_remove("ALIBABA_CLOUD_ACCESS_KEY_SECRET")
            .env_remove("ALIBABA_CLOUD_SECURITY_TOKEN")
            .env_remove("ALIBABA_CLOUD_REGION_ID")
            .env_remove("RUST_LOG");
        cmd
    }

    fn missing_config(&self) -> PathBuf {
        self.root.path().join("no-such-config.yaml")
    }

    #[allow(dead_code)]
    pub fn exists(&self, relative: impl AsRef<Path>) -> bool {
        self.root.path().join(relative).exists()
    }
}
