//! ApsaraDB RDS

pub mod account;
pub mod account_privilege;
pub mod backup_policy;
pub mod database;
pub mod service;

pub use account::{AccountConfig, RdsAccount};
pub use account_privilege::{AccountPrivilegeConfig, DbAccountPrivilege};
pub use backup_policy::{BackupPolicyConfig, DataBackupPolicy, DbBackupPolicy, LogBackupPolicy};
pub use database::{DatabaseConfig, DbDatabase};
pub use service::{
    Account, BackupPolicy, Database, DbInstance, GRANTED, Grant, GrantProbe, NOT_GRANTED,
    RdsService, privilege_matches,
};
