//! `db_account_privilege` resource
//!
//! One account's privilege across a set of databases on one instance. Each
//! database is granted or revoked on its own and confirmed through
//! `DescribeDatabases`, which is where the grant becomes visible.

use super::service::{GRANTED, Grant, NOT_GRANTED, RdsService, privilege_matches};
use crate::common::{DEFAULT_INTERVAL_SHORT, DEFAULT_TIMEOUT_MEDIUM, RDS, mutate_policy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use stratus_cloud::{
    CloudError, Context, Lifecycle, OPERATION_DENIED_DB_STATUS, ResourceData, Result, WaitSpec,
    composite_id, parse_composite_id, wait_for_state,
};

const DB_NOT_VISIBLE: &str = "InvalidDB.NotFound";
const GRANT_TIMEOUT: Duration = Duration::from_secs(3 * 60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountPrivilegeConfig {
    pub instance_id: String,
    pub account_name: String,
    /// `ReadOnly`, `ReadWrite`, `DDLOnly`, `DMLOnly` or `DBOwner`
    pub privilege: String,
    pub db_names: BTreeSet<String>,
}

impl Default for AccountPrivilegeConfig {
    fn default() -> Self {
        Self {
            instance_id: String::new(),
            account_name: String::new(),
            privilege: "ReadOnly".to_string(),
            db_names: BTreeSet::new(),
        }
    }
}

/// Target of one grant or revoke.
struct Target<'a> {
    id: &'a str,
    instance: &'a str,
    account: &'a str,
    privilege: &'a str,
}

impl<'a> Target<'a> {
    fn parse(id: &'a str) -> Result<Self> {
        let parts = parse_composite_id(id, 3)?;
        Ok(Self {
            id,
            instance: parts[0],
            account: parts[1],
            privilege: parts[2],
        })
    }
}

pub struct DbAccountPrivilege {
    service: RdsService,
}

impl DbAccountPrivilege {
    pub fn new(ctx: Context) -> Self {
        Self {
            service: RdsService::new(ctx),
        }
    }

    async fn grant(&self, target: &Target<'_>, db_name: &str) -> Result<()> {
        let codes: Vec<&str> = OPERATION_DENIED_DB_STATUS
            .iter()
            .copied()
            .chain([DB_NOT_VISIBLE])
            .collect();

        self.service
            .context()
            .request(RDS, "GrantAccountPrivilege")
            .id(target.id)
            .with_region()
            .param("DBInstanceId", target.instance)
            .param("AccountName", target.account)
            .param("DBName", db_name)
            .param("AccountPrivilege", target.privilege)
            .with_source_ip()
            .expect(&codes)
            .policy(mutate_policy(GRANT_TIMEOUT))
            .send()
            .await?;

        let probe = self.service.grant_probe(target.account, target.privilege);
        let spec = WaitSpec::new([GRANTED], DEFAULT_TIMEOUT_MEDIUM).interval(DEFAULT_INTERVAL_SHORT);
        wait_for_state::<Grant, _>(&probe, &composite_id(&[target.instance, db_name]), &spec)
            .await?;
        tracing::info!(id = %target.id, db = %db_name, "granted");
        Ok(())
    }

    async fn revoke(&self, target: &Target<'_>, db_name: &str) -> Result<()> {
        let result = self
            .service
            .context()
            .request(RDS, "RevokeAccountPrivilege")
            .id(target.id)
            .with_region()
            .param("DBInstanceId", target.instance)
            .param("AccountName", target.account)
            .param("DBName", db_name)
            .with_source_ip()
            .expect(OPERATION_DENIED_DB_STATUS)
            .policy(mutate_policy(GRANT_TIMEOUT))
            .send()
            .await;

        match result {
            Ok(_) => {}
            Err(e) if e.has_code(&[DB_NOT_VISIBLE]) => {
                tracing::warn!(id = %target.id, db = %db_name, error = %e, "database not found while revoking");
            }
            Err(e) => return Err(e),
        }

        let probe = self.service.grant_probe(target.account, target.privilege);
        let spec = WaitSpec::new([NOT_GRANTED], DEFAULT_TIMEOUT_MEDIUM)
            .interval(DEFAULT_INTERVAL_SHORT)
            .accept_absent();
        wait_for_state::<Grant, _>(&probe, &composite_id(&[target.instance, db_name]), &spec)
            .await?;
        tracing::info!(id = %target.id, db = %db_name, "revoked");
        Ok(())
    }
}

#[async_trait]
impl Lifecycle for DbAccountPrivilege {
    type Config = AccountPrivilegeConfig;

    fn resource_type(&self) -> &'static str {
        "db_account_privilege"
    }

    async fn create(&self, data: &mut ResourceData<AccountPrivilegeConfig>) -> Result<()> {
        let c = &data.config;
        let id = composite_id(&[
            c.instance_id.as_str(),
            c.account_name.as_str(),
            c.privilege.as_str(),
        ]);

        self.service
            .wait_instance_running(&c.instance_id, data.timeouts.create)
            .await?;

        data.set_id(id);
        self.update(data).await
    }

    async fn read(&self, data: &mut ResourceData<AccountPrivilegeConfig>) -> Result<()> {
        let Some(id) = data.id().map(str::to_string) else {
            return Ok(());
        };

        match self.service.describe_account_privilege(&id).await {
            Ok(account) => {
                let target = Target::parse(&id)?;
                let c = &mut data.config;
                c.instance_id = target.instance.to_string();
                c.account_name = target.account.to_string();
                c.privilege = target.privilege.to_string();
                c.db_names = account
                    .database_privileges
                    .entries
                    .into_iter()
                    .filter(|p| privilege_matches(target.privilege, &p.account_privilege))
                    .map(|p| p.db_name)
                    .collect();
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!(id = %id, "account privilege is gone, removing from state");
                data.clear_id();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn update(&self, data: &mut ResourceData<AccountPrivilegeConfig>) -> Result<()> {
        let id = data
            .id()
            .map(str::to_string)
            .ok_or_else(|| CloudError::InvalidConfig("update called without an id".to_string()))?;
        let target = Target::parse(&id)?;

        let c = &data.config;
        if c.instance_id != target.instance
            || c.account_name != target.account
            || c.privilege != target.privilege
        {
            return Err(CloudError::InvalidConfig(format!(
                "account privilege {id}: instance, account and privilege are fixed at creation"
            )));
        }

        if data.has_change(|c| &c.db_names) {
            let before = data.prior().map(|p| p.db_names.clone()).unwrap_or_default();
            let after = &data.config.db_names;

            for db in after.difference(&before) {
                self.grant(&target, db).await?;
            }
            for db in before.difference(after) {
                self.revoke(&target, db).await?;
            }
        }

        self.read(data).await
    }

    async fn delete(&self, data: &mut ResourceData<AccountPrivilegeConfig>) -> Result<()> {
        let Some(id) = data.id().map(str::to_string) else {
            return Ok(());
        };
        let target = Target::parse(&id)?;

        for db in &data.config.db_names {
            self.revoke(&target, db).await?;
        }
        data.clear_id();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parse() {
        let target = Target::parse("rm-1:reporter:ReadOnly").unwrap();
        assert_eq!(target.instance, "rm-1");
        assert_eq!(target.account, "reporter");
        assert_eq!(target.privilege, "ReadOnly");

        let err = Target::parse("rm-1:reporter").err().unwrap();
        assert!(matches!(err, CloudError::InvalidId { .. }));
    }

    #[test]
    fn test_default_privilege_is_read_only() {
        let config: AccountPrivilegeConfig =
            serde_json::from_value(serde_json::json!({"instance_id": "rm-1"})).unwrap();
        assert_eq!(config.privilege, "ReadOnly");
        assert!(config.db_names.is_empty());
    }
}
