//! Resource type name → handler dispatch

use crate::driver::{self, Outcome, Refreshed, Report};
use anyhow::Context as _;
use serde_json::Value;
use std::sync::Arc;
use stratus_cloud::{Context, ResourceState, Timeouts};
use stratus_cloud_aliyun::{
    Credentials, DbAccountPrivilege, DbBackupPolicy, DbDatabase, DtsSynchronizationJob,
    RdsAccount, RpcClient,
};
use stratus_config::Profile;

/// Bind `$handler` to the handler for `$resource_type` and evaluate `$body`.
macro_rules! with_handler {
    ($ctx:expr, $resource_type:expr, |$handler:ident| $body:expr) => {
        match $resource_type {
            "dts_synchronization_job" => {
                let $handler = DtsSynchronizationJob::new($ctx);
                $body
            }
            "rds_account" => {
                let $handler = RdsAccount::new($ctx);
                $body
            }
            "db_database" => {
                let $handler = DbDatabase::new($ctx);
                $body
            }
            "db_account_privilege" => {
                let $handler = DbAccountPrivilege::new($ctx);
                $body
            }
            "db_backup_policy" => {
                let $handler = DbBackupPolicy::new($ctx);
                $body
            }
            other => Err(anyhow::anyhow!("unknown resource type '{other}'")),
        }
    };
}

pub struct Handlers {
    ctx: Context,
}

impl Handlers {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Signed RPC transport configured from a profile.
    pub fn from_profile(profile: &Profile) -> anyhow::Result<Self> {
        let (key_id, key_secret) = profile.credentials()?;
        let mut credentials = Credentials::new(key_id, key_secret);
        if let Some(token) = &profile.security_token {
            credentials = credentials.with_security_token(token);
        }

        let mut client = RpcClient::new(credentials, &profile.region_id)
            .context("failed to build the API client")?;
        for (product, host) in &profile.endpoints {
            client = client.with_endpoint(product, host);
        }

        let mut ctx = Context::new(&profile.region_id, Arc::new(client));
        if let Some(source_ip) = &profile.source_ip {
            ctx = ctx.with_source_ip(source_ip);
        }
        tracing::debug!(region = %profile.region_id, "api context ready");
        Ok(Self::new(ctx))
    }

    pub async fn apply(
        &self,
        resource_type: &str,
        declared: &Value,
        known: Option<&ResourceState>,
        timeouts: Timeouts,
    ) -> anyhow::Result<Report<Outcome>> {
        with_handler!(self.ctx.clone(), resource_type, |handler| {
            driver::apply(&handler, declared, known, timeouts).await
        })
    }

    pub async fn refresh(&self, known: &ResourceState, timeouts: Timeouts) -> anyhow::Result<Refreshed> {
        with_handler!(self.ctx.clone(), known.resource_type.as_str(), |handler| {
            driver::refresh(&handler, known, timeouts).await
        })
    }

    pub async fn destroy(&self, known: &ResourceState, timeouts: Timeouts) -> anyhow::Result<()> {
        with_handler!(self.ctx.clone(), known.resource_type.as_str(), |handler| {
            driver::destroy(&handler, known, timeouts).await
        })
    }
}
