use super::{Project, load_profile, recorded_names, resource_timeouts};
use crate::driver::Refreshed;
use crate::handlers::Handlers;
use anyhow::Context as _;
use colored::Colorize;
use std::path::Path;
use stratus_cloud::ResourceStatus;

/// Re-read every recorded resource, report drift and forget the gone ones.
pub async fn handle(file: Option<&Path>, profile_name: Option<&str>) -> anyhow::Result<()> {
    let project = Project::load(file)?;

    let lock = project.state.acquire_lock().await?;
    let mut state = project.state.load().await?;
    if state.resources.is_empty() {
        println!("{}", "No resources recorded in state".yellow());
        lock.release().await?;
        return Ok(());
    }

    let profile = load_profile(profile_name)?;
    let handlers = Handlers::from_profile(&profile)?;

    let (mut in_sync, mut drifted, mut gone) = (0, 0, 0);
    for name in recorded_names(&project.manifest, &state) {
        let Some(known) = state.get_resource(&name).cloned() else {
            continue;
        };
        let timeouts = resource_timeouts(&profile, project.manifest.get(&name));

        let refreshed = handlers
            .refresh(&known, timeouts)
            .await
            .with_context(|| format!("failed to refresh '{name}'"))?;

        match refreshed {
            Refreshed::Gone => {
                println!("  {} {} ({})", "gone".red(), name, known.id);
                state.remove_resource(&name);
                gone += 1;
            }
            Refreshed::Present { config, drifted: true } => {
                println!("  {} {} ({})", "drifted".yellow(), name, known.id);
                if let Some(resource) = state.resources.get_mut(&name) {
                    resource.set_config(config, ResourceStatus::Ready);
                }
                drifted += 1;
            }
            Refreshed::Present { config, drifted: false } => {
                println!("  {} {} ({})", "in sync".green(), name, known.id);
                if let Some(resource) = state.resources.get_mut(&name) {
                    resource.set_config(config, ResourceStatus::Ready);
                }
                in_sync += 1;
            }
        }
        project.state.save(&state).await?;
    }

    lock.release().await?;

    println!();
    println!(
        "{}",
        format!("✓ Refresh complete: {in_sync} in sync, {drifted} drifted, {gone} gone")
            .green()
            .bold()
    );
    Ok(())
}
