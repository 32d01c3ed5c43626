//! `rds_account` resource

use super::service::{Account, RdsService};
use crate::common::{DEFAULT_INTERVAL_SHORT, RDS, mutate_policy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use stratus_cloud::{
    CloudError, Context, Lifecycle, OPERATION_DENIED_DB_STATUS, ResourceData, Result, WaitSpec,
    composite_id, parse_composite_id, wait_for_state,
};

const ACCOUNT_GONE: &[&str] = &["InvalidAccountName.NotFound", "InvalidDBInstanceId.NotFound"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    pub db_instance_id: String,
    pub account_name: String,
    pub account_password: Option<String>,
    /// `Normal` or `Super`
    pub account_type: Option<String>,
    pub account_description: Option<String>,
    pub status: Option<String>,
}

pub struct RdsAccount {
    service: RdsService,
}

impl RdsAccount {
    pub fn new(ctx: Context) -> Self {
        Self {
            service: RdsService::new(ctx),
        }
    }

    async fn wait_available(&self, id: &str, timeout: Duration) -> Result<()> {
        let spec = WaitSpec::new(["Available"], timeout).interval(DEFAULT_INTERVAL_SHORT);
        wait_for_state::<Account, _>(&self.service, id, &spec).await?;
        Ok(())
    }
}

#[async_trait]
impl Lifecycle for RdsAccount {
    type Config = AccountConfig;

    fn resource_type(&self) -> &'static str {
        "rds_account"
    }

    async fn create(&self, data: &mut ResourceData<AccountConfig>) -> Result<()> {
        let c = &data.config;
        let timeout = data.timeouts.create;
        let id = composite_id(&[c.db_instance_id.as_str(), c.account_name.as_str()]);

        self.service
            .context()
            .request(RDS, "CreateAccount")
            .id(&id)
            .with_region()
            .param("DBInstanceId", c.db_instance_id.as_str())
            .param("AccountName", c.account_name.as_str())
            .param_opt("AccountPassword", c.account_password.as_deref())
            .param_opt("AccountType", c.account_type.as_deref())
            .param_opt("AccountDescription", c.account_description.as_deref())
            .with_source_ip()
            .expect(OPERATION_DENIED_DB_STATUS)
            .policy(mutate_policy(timeout))
            .send()
            .await?;

        tracing::info!(id = %id, "created account");
        data.set_id(id.clone());
        self.wait_available(&id, timeout).await?;
        self.read(data).await
    }

    async fn read(&self, data: &mut ResourceData<AccountConfig>) -> Result<()> {
        let Some(id) = data.id().map(str::to_string) else {
            return Ok(());
        };

        match self.service.describe_account(&id).await {
            Ok(account) => {
                let parts = parse_composite_id(&id, 2)?;
                let c = &mut data.config;
                c.db_instance_id = parts[0].to_string();
                c.account_name = account.account_name;
                c.account_type = account.account_type;
                c.account_description = account.account_description;
                c.status = Some(account.account_status);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!(id = %id, "account is gone, removing from state");
                data.clear_id();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn update(&self, data: &mut ResourceData<AccountConfig>) -> Result<()> {
        let id = data
            .id()
            .map(str::to_string)
            .ok_or_else(|| CloudError::InvalidConfig("update called without an id".to_string()))?;
        let parts = parse_composite_id(&id, 2)?;
        let (instance, name) = (parts[0], parts[1]);
        let timeout = data.timeouts.update;

        if data.config.db_instance_id != instance || data.config.account_name != name {
            return Err(CloudError::InvalidConfig(format!(
                "account {id} cannot be renamed or moved; recreate it instead"
            )));
        }

        if data.has_change(|c| &c.account_description) {
            self.service
                .context()
                .request(RDS, "ModifyAccountDescription")
                .id(&id)
                .with_region()
                .param("DBInstanceId", instance)
                .param("AccountName", name)
                .param(
                    "AccountDescription",
                    data.config.account_description.clone().unwrap_or_default(),
                )
                .with_source_ip()
                .expect(OPERATION_DENIED_DB_STATUS)
                .policy(mutate_policy(timeout))
                .send()
                .await?;
        }

        if data.has_change(|c| &c.account_password) {
            self.service
                .context()
                .request(RDS, "ResetAccountPassword")
                .id(&id)
                .with_region()
                .param("DBInstanceId", instance)
                .param("AccountName", name)
                .param_opt("AccountPassword", data.config.account_password.as_deref())
                .with_source_ip()
                .expect(OPERATION_DENIED_DB_STATUS)
                .policy(mutate_policy(timeout))
                .send()
                .await?;
            self.wait_available(&id, timeout).await?;
        }

        self.read(data).await
    }

    async fn delete(&self, data: &mut ResourceData<AccountConfig>) -> Result<()> {
        let Some(id) = data.id().map(str::to_string) else {
            return Ok(());
        };
        let parts = parse_composite_id(&id, 2)?;
        let timeout = data.timeouts.delete;

        let result = self
            .service
            .context()
            .request(RDS, "DeleteAccount")
            .id(&id)
            .with_region()
            .param("DBInstanceId", parts[0])
            .param("AccountName", parts[1])
            .with_source_ip()
            .expect(OPERATION_DENIED_DB_STATUS)
            .policy(mutate_policy(timeout))
            .send()
            .await;

        match result {
            Ok(_) => {
                wait_for_state::<Account, _>(&self.service, &id, &WaitSpec::deleted(timeout))
                    .await?;
            }
            Err(e) if e.has_code(ACCOUNT_GONE) => {
                tracing::warn!(id = %id, "account already deleted");
            }
            Err(e) => return Err(e),
        }
        data.clear_id();
        Ok(())
    }
}
