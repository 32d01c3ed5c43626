use super::{Project, load_profile, resource_timeouts};
use crate::driver::Outcome;
use crate::handlers::Handlers;
use crate::manifest::ResourceSpec;
use anyhow::{Context as _, bail};
use colored::Colorize;
use serde_json::Value;
use std::path::Path;
use stratus_cloud::{GlobalState, ResourceState, ResourceStatus};

pub async fn handle(file: Option<&Path>, profile_name: Option<&str>) -> anyhow::Result<()> {
    let project = Project::load(file)?;
    let profile = load_profile(profile_name)?;
    let handlers = Handlers::from_profile(&profile)?;

    let lock = project.state.acquire_lock().await?;
    let mut state = project.state.load().await?;

    let resources = &project.manifest.resources;
    println!();
    println!("{}", format!("Applying {} resource(s)...", resources.len()).yellow());

    let mut outcomes = Vec::with_capacity(resources.len());
    for spec in resources {
        println!();
        println!("{}", format!("■ {} ({})", spec.name, spec.resource_type).bold());

        let known = state.get_resource(&spec.name);
        if let Some(known) = known
            && known.resource_type != spec.resource_type
        {
            bail!(
                "'{}' is recorded as {} but declared as {}; destroy it before changing its type",
                spec.name,
                known.resource_type,
                spec.resource_type
            );
        }

        let report = handlers
            .apply(
                &spec.resource_type,
                &spec.config,
                known,
                resource_timeouts(&profile, Some(spec)),
            )
            .await
            .with_context(|| format!("failed to apply '{}'", spec.name))?;

        match report.result {
            Ok(outcome) => {
                let Some(id) = report.id else {
                    bail!("'{}' has no id after {}", spec.name, outcome);
                };
                println!("  ✓ {} {}", outcome.to_string().green(), id.cyan());
                record(&mut state, spec, id, report.config, ResourceStatus::Ready);
                project.state.save(&state).await?;
                outcomes.push(outcome);
            }
            Err(err) => {
                println!("  ✗ {}", "failed".red());
                if let Some(id) = report.id {
                    record(&mut state, spec, id, report.config, ResourceStatus::Failed);
                    project.state.save(&state).await?;
                }
                return Err(anyhow::Error::new(err).context(format!("failed to apply '{}'", spec.name)));
            }
        }
    }

    for (name, _) in state
        .resources
        .iter()
        .filter(|(name, _)| project.manifest.get(name).is_none())
    {
        println!(
            "{}",
            format!("⚠ '{name}' is no longer declared; run `stratus destroy` to remove it").yellow()
        );
    }

    lock.release().await?;

    let count = |o: Outcome| outcomes.iter().filter(|x| **x == o).count();
    println!();
    println!(
        "{}",
        format!(
            "✓ Apply complete: {} created, {} recreated, {} updated, {} unchanged",
            count(Outcome::Created),
            count(Outcome::Recreated),
            count(Outcome::Updated),
            count(Outcome::Unchanged)
        )
        .green()
        .bold()
    );
    Ok(())
}

fn record(state: &mut GlobalState, spec: &ResourceSpec, id: String, config: Value, status: ResourceStatus) {
    if let Some(existing) = state.resources.get_mut(&spec.name)
        && existing.id == id
    {
        existing.set_config(config, status);
        return;
    }
    state.set_resource(
        spec.name.clone(),
        ResourceState::new(id, &spec.resource_type)
            .with_status(status)
            .with_config(config),
    );
}
