use super::{Project, load_profile, recorded_names, resource_timeouts};
use crate::handlers::Handlers;
use colored::Colorize;
use std::path::Path;
use stratus_cloud::ResourceStatus;

/// Delete every recorded resource, dependents first.
///
/// Manifest resources go in reverse declaration order; resources only
/// present in state follow.
pub async fn handle(file: Option<&Path>, profile_name: Option<&str>) -> anyhow::Result<()> {
    let project = Project::load(file)?;

    let lock = project.state.acquire_lock().await?;
    let mut state = project.state.load().await?;
    if state.resources.is_empty() {
        println!("{}", "Nothing to destroy".yellow());
        lock.release().await?;
        return Ok(());
    }

    let profile = load_profile(profile_name)?;
    let handlers = Handlers::from_profile(&profile)?;

    let names = recorded_names(&project.manifest, &state);
    let declared = names
        .iter()
        .filter(|name| project.manifest.get(name).is_some())
        .count();
    let (in_manifest, orphans) = names.split_at(declared);
    let order: Vec<&String> = in_manifest.iter().rev().chain(orphans).collect();

    println!();
    println!("{}", format!("Destroying {} resource(s)...", order.len()).yellow());

    for name in order {
        let Some(known) = state.get_resource(name).cloned() else {
            continue;
        };
        println!();
        println!("{}", format!("■ {} ({})", name, known.resource_type).bold());

        let timeouts = resource_timeouts(&profile, project.manifest.get(name));
        if let Err(err) = handlers.destroy(&known, timeouts).await {
            println!("  ✗ {}", "failed".red());
            if let Some(resource) = state.resources.get_mut(name) {
                resource.status = ResourceStatus::Failed;
            }
            project.state.save(&state).await?;
            return Err(err.context(format!("failed to destroy '{name}'")));
        }

        println!("  ✓ {} {}", "deleted".green(), known.id.cyan());
        state.remove_resource(name);
        project.state.save(&state).await?;
    }

    lock.release().await?;

    println!();
    println!("{}", "✓ Destroy complete".green().bold());
    Ok(())
}
