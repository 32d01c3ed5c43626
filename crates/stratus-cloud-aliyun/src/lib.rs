//! Alibaba Cloud handlers for Stratus
//!
//! Resource handlers for Data Transmission Service jobs and ApsaraDB RDS
//! accounts, databases, privileges and backup policies. Every handler
//! implements [`stratus_cloud::Lifecycle`] and talks to the API through a
//! [`stratus_cloud::Context`], normally backed by [`RpcClient`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use stratus_cloud::{Context, Lifecycle, ResourceData};
//! use stratus_cloud_aliyun::{Credentials, RpcClient, rds::{DatabaseConfig, DbDatabase}};
//!
//! let client = RpcClient::new(Credentials::new(key_id, key_secret), "cn-hangzhou")?;
//! let ctx = Context::new("cn-hangzhou", Arc::new(client));
//!
//! let handler = DbDatabase::new(ctx);
//! let mut data = ResourceData::new(DatabaseConfig {
//!     instance_id: "rm-abc".into(),
//!     name: "orders".into(),
//!     ..Default::default()
//! });
//! handler.create(&mut data).await?;
//! ```

pub mod client;
pub mod common;
pub mod dts;
pub mod error;
pub mod rds;

pub use client::{Credentials, RpcClient};
pub use dts::{DtsSynchronizationJob, SyncJobConfig};
pub use error::{AliyunError, Result};
pub use rds::{DbAccountPrivilege, DbBackupPolicy, DbDatabase, RdsAccount};

/// Resource types handled by this crate.
pub const RESOURCE_TYPES: &[&str] = &[
    "dts_synchronization_job",
    "rds_account",
    "db_database",
    "db_account_privilege",
    "db_backup_policy",
];
