//! `db_backup_policy` resource
//!
//! The policy always exists alongside its instance, so create and delete
//! both come down to `ModifyBackupPolicy`: create applies the declared
//! settings, delete puts the defaults back. Data and log settings are sent
//! as separate calls and each is followed by a wait for the instance to
//! return to `Running`.

use super::service::{BackupPolicy, DbInstance, RdsService};
use crate::common::{DEFAULT_TIMEOUT_MEDIUM, RDS, mutate_policy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stratus_cloud::{CloudError, Context, Lifecycle, ResourceData, Result};

const DEFAULT_BACKUP_TIME: &str = "02:00Z-03:00Z";
const DEFAULT_BACKUP_PERIOD: [&str; 3] = ["Tuesday", "Thursday", "Saturday"];
const DEFAULT_RETENTION_DAYS: u32 = 7;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupPolicyConfig {
    pub instance_id: String,
    #[serde(flatten)]
    pub data: DataBackupPolicy,
    #[serde(flatten)]
    pub log: LogBackupPolicy,
}

/// Settings sent with `BackupPolicyMode=DataBackupPolicy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataBackupPolicy {
    pub preferred_backup_period: Vec<String>,
    pub preferred_backup_time: String,
    pub backup_retention_period: u32,
    pub compress_type: Option<String>,
    pub released_keep_policy: Option<String>,
    pub category: Option<String>,
    /// SQL Server AlwaysOn only
    pub backup_priority: Option<u32>,
    /// SQL Server on cloud disks only
    pub enable_increment_data_backup: Option<bool>,
    pub backup_method: Option<String>,
    pub log_backup_frequency: Option<String>,
    /// MySQL on local SSD only
    pub archive_backup_retention_period: Option<u32>,
    pub archive_backup_keep_count: Option<u32>,
    pub archive_backup_keep_policy: Option<String>,
    /// MySQL and PostgreSQL on cloud disks only
    pub backup_interval: Option<String>,
}

impl Default for DataBackupPolicy {
    fn default() -> Self {
        Self {
            preferred_backup_period: DEFAULT_BACKUP_PERIOD.iter().map(|d| d.to_string()).collect(),
            preferred_backup_time: DEFAULT_BACKUP_TIME.to_string(),
            backup_retention_period: DEFAULT_RETENTION_DAYS,
            compress_type: None,
            released_keep_policy: None,
            category: None,
            backup_priority: None,
            enable_increment_data_backup: None,
            backup_method: None,
            log_backup_frequency: None,
            archive_backup_retention_period: None,
            archive_backup_keep_count: None,
            archive_backup_keep_policy: None,
            backup_interval: None,
        }
    }
}

/// Settings sent with `BackupPolicyMode=LogBackupPolicy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogBackupPolicy {
    pub enable_backup_log: bool,
    pub log_backup_retention_period: Option<u32>,
    pub local_log_retention_hours: Option<u32>,
    pub local_log_retention_space: Option<u32>,
    pub high_space_usage_protection: Option<String>,
    pub log_backup_local_retention_number: Option<u32>,
}

impl Default for LogBackupPolicy {
    fn default() -> Self {
        Self {
            enable_backup_log: true,
            log_backup_retention_period: Some(DEFAULT_RETENTION_DAYS),
            local_log_retention_hours: None,
            local_log_retention_space: None,
            high_space_usage_protection: None,
            log_backup_local_retention_number: None,
        }
    }
}

impl BackupPolicyConfig {
    fn refresh_from(&mut self, policy: BackupPolicy) {
        let data = &mut self.data;
        if let Some(period) = policy.preferred_backup_period {
            data.preferred_backup_period = period
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(time) = policy.preferred_backup_time {
            data.preferred_backup_time = time;
        }
        if let Some(days) = policy.backup_retention_period {
            data.backup_retention_period = days;
        }
        data.compress_type = policy.compress_type.or(data.compress_type.take());
        data.released_keep_policy = policy.released_keep_policy.or(data.released_keep_policy.take());
        data.category = policy.category.or(data.category.take());
        data.backup_method = policy.backup_method.or(data.backup_method.take());
        data.backup_interval = policy.backup_interval.or(data.backup_interval.take());

        let log = &mut self.log;
        if let Some(enabled) = policy.enable_backup_log {
            log.enable_backup_log = enabled;
        }
        log.log_backup_retention_period = policy
            .log_backup_retention_period
            .or(log.log_backup_retention_period);
        log.local_log_retention_hours = policy
            .local_log_retention_hours
            .or(log.local_log_retention_hours);
        log.local_log_retention_space = policy
            .local_log_retention_space
            .or(log.local_log_retention_space);
        log.high_space_usage_protection = policy
            .high_space_usage_protection
            .or(log.high_space_usage_protection.take());
        log.log_backup_local_retention_number = policy
            .log_backup_local_retention_number
            .or(log.log_backup_local_retention_number);
    }
}

pub struct DbBackupPolicy {
    service: RdsService,
}

impl DbBackupPolicy {
    pub fn new(ctx: Context) -> Self {
        Self {
            service: RdsService::new(ctx),
        }
    }

    async fn modify_data(&self, id: &str, instance: &DbInstance, data: &DataBackupPolicy) -> Result<()> {
        let sql_server = instance.is_sql_server();
        let mysql = instance.engine == "MySQL";
        let local_ssd = instance.has_local_ssd();

        let mut request = self
            .service
            .context()
            .request(RDS, "ModifyBackupPolicy")
            .id(id)
            .with_region()
            .param("DBInstanceId", id)
            .param("BackupPolicyMode", "DataBackupPolicy")
            .param("PreferredBackupPeriod", data.preferred_backup_period.join(","))
            .param("PreferredBackupTime", data.preferred_backup_time.as_str())
            .param("BackupRetentionPeriod", data.backup_retention_period.to_string())
            .param_opt("CompressType", data.compress_type.as_deref())
            .param_opt("ReleasedKeepPolicy", data.released_keep_policy.as_deref())
            .param_opt("Category", data.category.as_deref())
            .with_source_ip()
            .expect(&["OperationDenied.DBInstanceStatus"])
            .policy(mutate_policy(DEFAULT_TIMEOUT_MEDIUM));

        if sql_server && instance.category.as_deref() == Some("AlwaysOn") {
            request = request.param_opt("BackupPriority", data.backup_priority);
        }
        if sql_server && !local_ssd {
            request = request
                .param(
                    "EnableIncrementDataBackup",
                    data.enable_increment_data_backup.unwrap_or(false),
                )
                .param("BackupMethod", data.backup_method.as_deref().unwrap_or("Physical"));
        }
        if sql_server && data.log_backup_frequency.as_deref() == Some("LogInterval") {
            request = request.param("LogBackupFrequency", "LogInterval");
        }
        if mysql && local_ssd {
            request = request
                .param(
                    "ArchiveBackupRetentionPeriod",
                    data.archive_backup_retention_period.unwrap_or(0).to_string(),
                )
                .param(
                    "ArchiveBackupKeepCount",
                    data.archive_backup_keep_count.unwrap_or(1).to_string(),
                )
                .param(
                    "ArchiveBackupKeepPolicy",
                    data.archive_backup_keep_policy.as_deref().unwrap_or("0"),
                );
        }
        if (mysql || instance.engine == "PostgreSQL") && !local_ssd {
            request = request.param(
                "BackupInterval",
                data.backup_interval.as_deref().unwrap_or("-1"),
            );
        }

        request.send().await?;
        self.service
            .wait_instance_running(id, DEFAULT_TIMEOUT_MEDIUM)
            .await?;
        Ok(())
    }

    async fn modify_log(&self, id: &str, log: &LogBackupPolicy, retention_days: u32) -> Result<()> {
        self.service
            .context()
            .request(RDS, "ModifyBackupPolicy")
            .id(id)
            .with_region()
            .param("DBInstanceId", id)
            .param("BackupPolicyMode", "LogBackupPolicy")
            .param("EnableBackupLog", if log.enable_backup_log { "1" } else { "0" })
            .param_opt(
                "LogBackupRetentionPeriod",
                log_retention(log, retention_days).map(|d| d.to_string()),
            )
            .param_opt(
                "LocalLogRetentionHours",
                log.local_log_retention_hours.map(|h| h.to_string()),
            )
            .param_opt(
                "LocalLogRetentionSpace",
                log.local_log_retention_space.map(|s| s.to_string()),
            )
            .param_opt(
                "HighSpaceUsageProtection",
                log.high_space_usage_protection.as_deref(),
            )
            .param(
                "LogBackupLocalRetentionNumber",
                log.log_backup_local_retention_number.unwrap_or(60),
            )
            .with_source_ip()
            .expect(&["OperationDenied.DBInstanceStatus"])
            .policy(mutate_policy(DEFAULT_TIMEOUT_MEDIUM))
            .send()
            .await?;

        self.service
            .wait_instance_running(id, DEFAULT_TIMEOUT_MEDIUM)
            .await?;
        Ok(())
    }

    async fn apply(
        &self,
        id: &str,
        config: &BackupPolicyConfig,
        data_changed: bool,
        log_changed: bool,
    ) -> Result<()> {
        let instance = self.service.describe_instance(id).await?;

        if data_changed {
            self.modify_data(id, &instance, &config.data).await?;
        }
        if log_changed {
            if instance.is_sql_server() {
                tracing::debug!(id = %id, "log backup policy is not configurable on SQL Server");
            } else {
                self.modify_log(id, &config.log, config.data.backup_retention_period)
                    .await?;
            }
        }
        Ok(())
    }
}

/// Log backups cannot be kept longer than data backups.
fn log_retention(log: &LogBackupPolicy, retention_days: u32) -> Option<u32> {
    log.log_backup_retention_period
        .filter(|d| *d != 0)
        .map(|d| d.min(retention_days))
}

#[async_trait]
impl Lifecycle for DbBackupPolicy {
    type Config = BackupPolicyConfig;

    fn resource_type(&self) -> &'static str {
        "db_backup_policy"
    }

    async fn create(&self, data: &mut ResourceData<BackupPolicyConfig>) -> Result<()> {
        let id = data.config.instance_id.clone();
        if id.is_empty() {
            return Err(CloudError::InvalidConfig(
                "db_backup_policy requires instance_id".to_string(),
            ));
        }

        self.apply(&id, &data.config, true, true).await?;
        tracing::info!(id = %id, "applied backup policy");
        data.set_id(id);
        self.read(data).await
    }

    async fn read(&self, data: &mut ResourceData<BackupPolicyConfig>) -> Result<()> {
        let Some(id) = data.id().map(str::to_string) else {
            return Ok(());
        };

        match self.service.describe_backup_policy(&id).await {
            Ok(policy) => {
                data.config.instance_id = id;
                data.config.refresh_from(policy);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!(id = %id, "instance is gone, removing backup policy from state");
                data.clear_id();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn update(&self, data: &mut ResourceData<BackupPolicyConfig>) -> Result<()> {
        let id = data
            .id()
            .map(str::to_string)
            .ok_or_else(|| CloudError::InvalidConfig("update called without an id".to_string()))?;

        let data_changed = data.has_change(|c| &c.data);
        let log_changed = data.has_change(|c| &c.log);
        if data_changed || log_changed {
            self.apply(&id, &data.config, data_changed, log_changed)
                .await?;
        }
        self.read(data).await
    }

    async fn delete(&self, data: &mut ResourceData<BackupPolicyConfig>) -> Result<()> {
        let Some(id) = data.id().map(str::to_string) else {
            return Ok(());
        };

        let defaults = BackupPolicyConfig {
            instance_id: id.clone(),
            ..Default::default()
        };
        match self.apply(&id, &defaults, true, true).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::warn!(id = %id, "instance already gone");
            }
            Err(e) => return Err(e),
        }
        data.clear_id();
        Ok(())
    }
}
