//! Generic plan execution over [`Lifecycle`] handlers
//!
//! State keeps, per resource, the configuration as last read back from the
//! cloud. Applying overlays the declared fields on top of it, so fields the
//! cloud fills in (ids, ports, defaults) survive and only declared fields
//! can register as changes.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use stratus_cloud::{CloudError, Lifecycle, ResourceData, ResourceState, Timeouts};
use stratus_config::TimeoutConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    /// Recorded in state but gone remotely, so created again
    Recreated,
    Updated,
    Unchanged,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Created => write!(f, "created"),
            Outcome::Recreated => write!(f, "recreated"),
            Outcome::Updated => write!(f, "updated"),
            Outcome::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// What a remote operation left behind, even when it failed halfway.
#[derive(Debug)]
pub struct Report<T> {
    pub id: Option<String>,
    pub config: Value,
    pub result: stratus_cloud::Result<T>,
}

/// Result of reading one recorded resource.
#[derive(Debug, PartialEq)]
pub enum Refreshed {
    Gone,
    Present { config: Value, drifted: bool },
}

pub fn timeouts(config: &TimeoutConfig) -> Timeouts {
    Timeouts {
        create: config.create(),
        update: config.update(),
        delete: config.delete(),
    }
}

/// Declared fields replace recorded ones; everything else is kept.
pub fn overlay(base: &Value, declared: &Value) -> Value {
    match (base, declared) {
        (Value::Object(base), Value::Object(declared)) => {
            let mut merged = base.clone();
            for (key, value) in declared {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        _ => declared.clone(),
    }
}

/// Converge one resource to its declared configuration.
///
/// The outer error covers local problems (a config that does not decode);
/// remote failures land in [`Report::result`] together with whatever id the
/// handler had obtained.
pub async fn apply<L>(
    handler: &L,
    declared: &Value,
    known: Option<&ResourceState>,
    timeouts: Timeouts,
) -> anyhow::Result<Report<Outcome>>
where
    L: Lifecycle,
    L::Config: Serialize + DeserializeOwned,
{
    let mut recreate = false;

    if let Some(known) = known {
        let recorded: L::Config = known.typed_config()?;
        let mut current = ResourceData::existing(&known.id, recorded.clone(), recorded)
            .with_timeouts(timeouts);

        if let Err(err) = handler.read(&mut current).await {
            return Ok(report(&current, Err(err)));
        }

        if let Some(id) = current.id().map(str::to_string) {
            let merged = overlay(&serde_json::to_value(&current.config)?, declared);
            let wanted: L::Config = serde_json::from_value(merged)?;
            if wanted == current.config {
                tracing::debug!(resource_type = handler.resource_type(), %id, "already converged");
                return Ok(report(&current, Ok(Outcome::Unchanged)));
            }

            tracing::info!(resource_type = handler.resource_type(), %id, "updating");
            let mut data = ResourceData::existing(id, wanted, current.config).with_timeouts(timeouts);
            let result = handler.update(&mut data).await.map(|_| Outcome::Updated);
            return Ok(report(&data, result));
        }

        tracing::warn!(
            resource_type = handler.resource_type(),
            id = %known.id,
            "recorded resource no longer exists, creating it again"
        );
        recreate = true;
    }

    let config: L::Config = serde_json::from_value(declared.clone())?;
    let mut data = ResourceData::new(config).with_timeouts(timeouts);
    tracing::info!(resource_type = handler.resource_type(), "creating");
    let result = handler.create(&mut data).await.and_then(|_| {
        if data.id().is_none() {
            return Err(CloudError::StateError(format!(
                "{} create finished without an id",
                handler.resource_type()
            )));
        }
        Ok(if recreate { Outcome::Recreated } else { Outcome::Created })
    });
    Ok(report(&data, result))
}

/// Read a recorded resource and compare it with what state holds.
pub async fn refresh<L>(
    handler: &L,
    known: &ResourceState,
    timeouts: Timeouts,
) -> anyhow::Result<Refreshed>
where
    L: Lifecycle,
    L::Config: Serialize + DeserializeOwned,
{
    let recorded: L::Config = known.typed_config()?;
    let mut data =
        ResourceData::existing(&known.id, recorded.clone(), recorded.clone()).with_timeouts(timeouts);
    handler.read(&mut data).await?;

    if data.id().is_none() {
        return Ok(Refreshed::Gone);
    }
    Ok(Refreshed::Present {
        drifted: data.config != recorded,
        config: serde_json::to_value(&data.config)?,
    })
}

/// Delete a recorded resource.
pub async fn destroy<L>(handler: &L, known: &ResourceState, timeouts: Timeouts) -> anyhow::Result<()>
where
    L: Lifecycle,
    L::Config: Serialize + DeserializeOwned,
{
    let recorded: L::Config = known.typed_config()?;
    let mut data =
        ResourceData::existing(&known.id, recorded.clone(), recorded).with_timeouts(timeouts);
    tracing::info!(resource_type = handler.resource_type(), id = %known.id, "deleting");
    handler.delete(&mut data).await?;
    Ok(())
}

fn report<C, T>(data: &ResourceData<C>, result: stratus_cloud::Result<T>) -> Report<T>
where
    C: Serialize + Clone + Default + PartialEq,
{
    Report {
        id: data.id().map(str::to_string),
        config: serde_json::to_value(&data.config).unwrap_or(Value::Null),
        result,
    }
}
