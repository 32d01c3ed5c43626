//! RDS describe calls and typed snapshots

use crate::common::{
    DEFAULT_INTERVAL_SHORT, DESCRIBE_TIMEOUT, RDS, decode, lenient_bool, lenient_string,
    lenient_u32, pointer,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use stratus_cloud::{
    CloudError, Context, Describe, Result, Stateful, WaitSpec, composite_id, parse_composite_id,
    wait_for_state,
};

const INSTANCE_NOT_FOUND: &[&str] = &[
    "InvalidDBInstanceId.NotFound",
    "InvalidDBInstanceName.NotFound",
];

const DATABASE_NOT_FOUND: &[&str] = &[
    "InvalidDBName.NotFound",
    "InvalidDBInstanceId.NotFound",
    "InvalidDBInstanceId.NotFoundError",
];

pub const GRANTED: &str = "Granted";
pub const NOT_GRANTED: &str = "NotGranted";

/// Entry of `DescribeDBInstanceAttribute`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DbInstance {
    #[serde(rename = "DBInstanceId")]
    pub id: String,
    #[serde(rename = "DBInstanceStatus")]
    pub status: String,
    #[serde(default)]
    pub engine: String,
    #[serde(default)]
    pub engine_version: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(rename = "DBInstanceStorageType", default)]
    pub storage_type: Option<String>,
}

impl DbInstance {
    pub fn is_sql_server(&self) -> bool {
        self.engine == "SQLServer"
    }

    pub fn has_local_ssd(&self) -> bool {
        self.storage_type.as_deref() == Some("local_ssd")
    }
}

impl Stateful for DbInstance {
    fn status(&self) -> &str {
        &self.status
    }
}

/// Entry of `DescribeDatabases`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Database {
    #[serde(rename = "DBName")]
    pub name: String,
    #[serde(rename = "DBStatus")]
    pub status: String,
    #[serde(rename = "DBDescription", default)]
    pub description: Option<String>,
    #[serde(default)]
    pub character_set_name: Option<String>,
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub accounts: DatabaseAccounts,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseAccounts {
    #[serde(rename = "AccountPrivilegeInfo", default)]
    pub privileges: Vec<AccountPrivilegeInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccountPrivilegeInfo {
    pub account: String,
    pub account_privilege: String,
}

impl Database {
    /// Whether `account` holds `privilege` on this database.
    pub fn grants(&self, account: &str, privilege: &str) -> bool {
        self.accounts
            .privileges
            .iter()
            .any(|p| p.account == account && privilege_matches(privilege, &p.account_privilege))
    }
}

impl Stateful for Database {
    fn status(&self) -> &str {
        &self.status
    }
}

/// Entry of `DescribeAccounts`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Account {
    pub account_name: String,
    pub account_status: String,
    #[serde(default)]
    pub account_description: Option<String>,
    #[serde(default)]
    pub account_type: Option<String>,
    #[serde(rename = "DBInstanceId", default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub database_privileges: DatabasePrivileges,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabasePrivileges {
    #[serde(rename = "DatabasePrivilege", default)]
    pub entries: Vec<DatabasePrivilege>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatabasePrivilege {
    #[serde(rename = "DBName")]
    pub db_name: String,
    pub account_privilege: String,
}

impl Stateful for Account {
    fn status(&self) -> &str {
        &self.account_status
    }
}

/// `DescribeBackupPolicy` response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BackupPolicy {
    #[serde(default)]
    pub preferred_backup_time: Option<String>,
    #[serde(default)]
    pub preferred_backup_period: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub backup_retention_period: Option<u32>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub enable_backup_log: Option<bool>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub log_backup_retention_period: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub local_log_retention_hours: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub local_log_retention_space: Option<u32>,
    #[serde(default)]
    pub high_space_usage_protection: Option<String>,
    #[serde(default)]
    pub log_backup_frequency: Option<String>,
    #[serde(default)]
    pub compress_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub archive_backup_retention_period: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub archive_backup_keep_count: Option<u32>,
    #[serde(default)]
    pub archive_backup_keep_policy: Option<String>,
    #[serde(default)]
    pub released_keep_policy: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub backup_interval: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub enable_increment_data_backup: Option<bool>,
    #[serde(default)]
    pub backup_method: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub log_backup_local_retention_number: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub backup_priority: Option<u32>,
}

/// Privilege names some engines report differently from what was granted.
pub fn privilege_matches(declared: &str, reported: &str) -> bool {
    declared == reported || (declared == "DBOwner" && matches!(reported, "ALL" | "DbOwner"))
}

/// Whether one account holds one privilege on one database.
#[derive(Debug, Clone)]
pub struct Grant {
    pub status: &'static str,
}

impl Stateful for Grant {
    fn status(&self) -> &str {
        self.status
    }
}

pub struct RdsService {
    ctx: Context,
}

impl RdsService {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub async fn describe_instance(&self, id: &str) -> Result<DbInstance> {
        let response = self
            .ctx
            .request(RDS, "DescribeDBInstanceAttribute")
            .id(id)
            .with_region()
            .param("DBInstanceId", id)
            .with_source_ip()
            .expect(&["InvalidParameter"])
            .timeout(DESCRIBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| not_found_on(e, INSTANCE_NOT_FOUND, "DBInstance", id))?;

        first(id, "DBInstance", &response, &["Items", "DBInstanceAttribute"])
    }

    /// `id` is `instance:database`.
    pub async fn describe_database(&self, id: &str) -> Result<Database> {
        let parts = parse_composite_id(id, 2)?;
        let response = self
            .ctx
            .request(RDS, "DescribeDatabases")
            .id(id)
            .with_region()
            .param("DBInstanceId", parts[0])
            .param("DBName", parts[1])
            .with_source_ip()
            .expect(&["InternalError", "OperationDenied.DBInstanceStatus"])
            .timeout(DESCRIBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| not_found_on(e, DATABASE_NOT_FOUND, "DBDatabase", id))?;

        first(id, "DBDatabase", &response, &["Databases", "Database"])
    }

    /// `id` is `instance:account`.
    pub async fn describe_account(&self, id: &str) -> Result<Account> {
        let parts = parse_composite_id(id, 2)?;
        let response = self
            .ctx
            .request(RDS, "DescribeAccounts")
            .id(id)
            .with_region()
            .param("DBInstanceId", parts[0])
            .param("AccountName", parts[1])
            .with_source_ip()
            .expect(&["OperationDenied.DBInstanceStatus"])
            .timeout(DESCRIBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| not_found_on(e, &["InvalidDBInstanceId.NotFound"], "DBAccount", id))?;

        first(id, "DBAccount", &response, &["Accounts", "DBInstanceAccount"])
    }

    /// `id` is `instance:account:privilege`; the account's grants come back
    /// in `database_privileges`.
    pub async fn describe_account_privilege(&self, id: &str) -> Result<Account> {
        let parts = parse_composite_id(id, 3)?;
        self.describe_account(&composite_id(&parts[..2]))
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    CloudError::not_found("DBAccountPrivilege", id)
                } else {
                    e
                }
            })
    }

    pub async fn describe_backup_policy(&self, id: &str) -> Result<BackupPolicy> {
        let response = self
            .ctx
            .request(RDS, "DescribeBackupPolicy")
            .id(id)
            .with_region()
            .param("DBInstanceId", id)
            .with_source_ip()
            .timeout(DESCRIBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                not_found_on(e, &["InvalidDBInstanceId.NotFound"], "DBBackupPolicy", id)
            })?;

        decode(id, "$", response)
    }

    /// Poll until the instance is back to `Running` after a modification.
    pub async fn wait_instance_running(&self, id: &str, timeout: Duration) -> Result<DbInstance> {
        let spec = WaitSpec::new(["Running"], timeout)
            .interval(DEFAULT_INTERVAL_SHORT)
            .ignore_case();
        wait_for_state::<DbInstance, _>(self, id, &spec)
            .await?
            .ok_or_else(|| CloudError::not_found("DBInstance", id))
    }

    /// Describe source reporting whether `account` holds `privilege`.
    /// Its ids are `instance:database`.
    pub fn grant_probe<'a>(&'a self, account: &'a str, privilege: &'a str) -> GrantProbe<'a> {
        GrantProbe {
            service: self,
            account,
            privilege,
        }
    }
}

#[async_trait]
impl Describe<DbInstance> for RdsService {
    async fn describe(&self, id: &str) -> Result<DbInstance> {
        self.describe_instance(id).await
    }
}

#[async_trait]
impl Describe<Database> for RdsService {
    async fn describe(&self, id: &str) -> Result<Database> {
        self.describe_database(id).await
    }
}

#[async_trait]
impl Describe<Account> for RdsService {
    async fn describe(&self, id: &str) -> Result<Account> {
        self.describe_account(id).await
    }
}

pub struct GrantProbe<'a> {
    service: &'a RdsService,
    account: &'a str,
    privilege: &'a str,
}

#[async_trait]
impl Describe<Grant> for GrantProbe<'_> {
    async fn describe(&self, id: &str) -> Result<Grant> {
        let database = self.service.describe_database(id).await?;
        let status = if database.grants(self.account, self.privilege) {
            GRANTED
        } else {
            NOT_GRANTED
        };
        Ok(Grant { status })
    }
}

fn not_found_on(err: CloudError, codes: &[&str], resource: &str, id: &str) -> CloudError {
    if err.has_code(codes) {
        CloudError::not_found(resource, id)
    } else {
        err
    }
}

/// First element of the list at `path`; an empty list means absent.
fn first<T: serde::de::DeserializeOwned>(
    id: &str,
    resource: &str,
    response: &Value,
    path: &[&str],
) -> Result<T> {
    let list = pointer(id, response, path)?;
    let items = list
        .as_array()
        .ok_or_else(|| CloudError::malformed(id, format!("$.{}", path.join(".")), "not a list"))?;
    match items.first() {
        Some(item) => decode(id, &format!("$.{}[0]", path.join(".")), item.clone()),
        None => Err(CloudError::not_found(resource, id)),
    }
}
