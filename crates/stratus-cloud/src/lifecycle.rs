//! Resource lifecycle surface
//!
//! A handler receives a [`ResourceData`] holding the declared configuration,
//! the configuration it last applied (if any) and the operation timeouts.
//! Handlers fill in the remote id on create, project remote state back into
//! the configuration on read, and clear the id when the entity is gone.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-operation deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(with = "secs")]
    pub create: Duration,
    #[serde(with = "secs")]
    pub update: Duration,
    #[serde(with = "secs")]
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(20 * 60),
            update: Duration::from_secs(10 * 60),
            delete: Duration::from_secs(20 * 60),
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// Declared configuration of one resource plus what was applied before.
#[derive(Debug, Clone)]
pub struct ResourceData<C> {
    id: Option<String>,
    pub config: C,
    prior: Option<C>,
    pub timeouts: Timeouts,
}

impl<C: Clone + Default + PartialEq> ResourceData<C> {
    /// A resource that has not been created yet.
    pub fn new(config: C) -> Self {
        Self {
            id: None,
            config,
            prior: None,
            timeouts: Timeouts::default(),
        }
    }

    /// A resource known by `id` whose last applied configuration is `prior`.
    pub fn existing(id: impl Into<String>, config: C, prior: C) -> Self {
        Self {
            id: Some(id.into()),
            config,
            prior: Some(prior),
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// Mark the entity as gone.
    pub fn clear_id(&mut self) {
        self.id = None;
    }

    /// True when there is no previously applied configuration.
    pub fn is_new(&self) -> bool {
        self.prior.is_none()
    }

    /// Whether a field differs from what was applied before.
    ///
    /// For a new resource the comparison is against `C::default()`, so only
    /// fields that were actually declared count as changed.
    pub fn has_change<T, F>(&self, field: F) -> bool
    where
        T: PartialEq + ?Sized,
        F: Fn(&C) -> &T,
    {
        match &self.prior {
            Some(prior) => field(prior) != field(&self.config),
            None => field(&C::default()) != field(&self.config),
        }
    }

    pub fn prior(&self) -> Option<&C> {
        self.prior.as_ref()
    }
}

/// CRUD handlers for one resource type.
///
/// Each call runs to completion, including every retry and wait, and
/// reports a single outcome.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    type Config: Clone + Default + PartialEq + Send + Sync;

    fn resource_type(&self) -> &'static str;

    async fn create(&self, data: &mut ResourceData<Self::Config>) -> Result<()>;

    /// Refresh `data.config` from the remote entity. Clears the id when absent.
    async fn read(&self, data: &mut ResourceData<Self::Config>) -> Result<()>;

    async fn update(&self, data: &mut ResourceData<Self::Config>) -> Result<()>;

    async fn delete(&self, data: &mut ResourceData<Self::Config>) -> Result<()>;
}
