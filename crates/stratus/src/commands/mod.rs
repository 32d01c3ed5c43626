pub mod apply;
pub mod destroy;
pub mod refresh;

use crate::driver;
use crate::manifest::{self, Manifest, ResourceSpec};
use anyhow::Context as _;
use colored::Colorize;
use std::path::Path;
use stratus_cloud::{GlobalState, StateManager, Timeouts};
use stratus_config::Profile;

/// A manifest and the state directory that goes with it.
pub struct Project {
    pub manifest: Manifest,
    pub state: StateManager,
}

impl Project {
    /// Load `file`, or discover the manifest from the current directory.
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        let manifest_path = match file {
            Some(path) => path.to_path_buf(),
            None => stratus_config::find_manifest_file()?,
        };
        let manifest = Manifest::load(&manifest_path)?;
        let state = StateManager::new(manifest::project_root(&manifest_path));

        println!("Manifest: {}", manifest_path.display().to_string().cyan());
        Ok(Self { manifest, state })
    }
}

pub fn load_profile(name: Option<&str>) -> anyhow::Result<Profile> {
    let profile = stratus_config::load_profile(name).context("failed to load profile")?;
    tracing::debug!(?profile, "profile loaded");
    Ok(profile)
}

/// Profile timeouts, overridden per resource by the manifest.
pub fn resource_timeouts(profile: &Profile, spec: Option<&ResourceSpec>) -> Timeouts {
    let config = spec.and_then(|s| s.timeouts).unwrap_or(profile.timeouts);
    driver::timeouts(&config)
}

/// Names recorded in state: manifest order first, then state-only ones.
pub fn recorded_names(manifest: &Manifest, state: &GlobalState) -> Vec<String> {
    let mut names: Vec<String> = manifest
        .resources
        .iter()
        .filter(|r| state.get_resource(&r.name).is_some())
        .map(|r| r.name.clone())
        .collect();

    let mut orphans: Vec<String> = state
        .resources
        .keys()
        .filter(|name| manifest.get(name).is_none())
        .cloned()
        .collect();
    orphans.sort();
    names.extend(orphans);
    names
}
