//! DTS job describe and status transitions

use crate::common::{DESCRIBE_TIMEOUT, DTS, decode, lenient_bool, lenient_string, mutate_policy};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use stratus_cloud::{
    CloudError, Context, Describe, Edge, EdgeSource, Result, Stateful, TransitionTable,
    Transitions, drive_to_state,
};

/// States a synchronization job never leaves on its own.
pub const JOB_FAILURE_STATES: &[&str] = &["PrecheckFailed", "InitializeFailed", "Failed"];

const JOB_NOT_FOUND: &[&str] = &["Forbidden.InstanceNotFound"];

/// `DescribeDtsJobDetail` response, projected to the fields handlers use.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SyncJob {
    pub status: String,
    #[serde(default)]
    pub dts_job_name: Option<String>,
    #[serde(rename = "DtsInstanceID", default)]
    pub dts_instance_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub checkpoint: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub db_object: Option<String>,
    #[serde(default)]
    pub synchronization_direction: Option<String>,
    pub migration_mode: MigrationMode,
    pub source_endpoint: Endpoint,
    pub destination_endpoint: Endpoint,
}

impl Stateful for SyncJob {
    fn status(&self) -> &str {
        &self.status
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MigrationMode {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub data_initialization: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub data_synchronization: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub structure_initialization: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Endpoint {
    #[serde(default)]
    pub database_name: Option<String>,
    #[serde(default)]
    pub engine_name: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(rename = "InstanceID", default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub instance_type: Option<String>,
    #[serde(rename = "OracleSID", default)]
    pub oracle_sid: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub port: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub aliyun_uid: Option<String>,
    #[serde(default)]
    pub role_name: Option<String>,
}

/// Canonical upper-case spelling for source engine names the API returns
/// in mixed case. Unknown names pass through unchanged.
pub fn normalize_source_engine(name: &str) -> String {
    match name {
        "polardb_pg" => "POLARDB_PG",
        "express" => "EXPRESS",
        "PostgreSQL" => "POSTGRESQL",
        "MongoDB" => "MONGODB",
        "as400" => "AS400",
        "Redis" => "REDIS",
        "TeraData" => "TERADATA",
        "polardb_o" => "POLARDB_O",
        "polardbx20" => "POLARDBX20",
        "Oracle" => "ORACLE",
        "DMSPolarDB" => "DMSPOLARDB",
        other => other,
    }
    .to_string()
}

fn job_transitions() -> TransitionTable {
    TransitionTable::new(vec![
        Edge::new(EdgeSource::Any, "Synchronizing", "StartDtsJob").delay(Duration::from_secs(60)),
        Edge::new(EdgeSource::From("Synchronizing"), "Suspending", "SuspendDtsJob")
            .delay(Duration::from_secs(5)),
    ])
    .with_failure_states(JOB_FAILURE_STATES)
}

pub struct DtsService {
    ctx: Context,
    transitions: TransitionTable,
}

impl DtsService {
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            transitions: job_transitions(),
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub async fn describe_job(&self, id: &str) -> Result<SyncJob> {
        let response = self
            .ctx
            .request(DTS, "DescribeDtsJobDetail")
            .id(id)
            .param("DtsJobId", id)
            .with_region()
            .timeout(DESCRIBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                if e.has_code(JOB_NOT_FOUND) {
                    CloudError::not_found("DtsSynchronizationJob", id)
                } else {
                    e
                }
            })?;
        decode(id, "$", response)
    }

    /// Whether some transition leads to `target`.
    pub fn is_drivable(&self, target: &str) -> bool {
        self.transitions.is_reachable(target)
    }

    /// Bring job `id` to `target` (`Synchronizing` or `Suspending`).
    pub async fn drive_status(
        &self,
        id: &str,
        target: &str,
        direction: Option<&str>,
        timeout: Duration,
    ) -> Result<()> {
        let driver = JobDriver {
            service: self,
            direction,
            timeout,
        };
        drive_to_state::<SyncJob, _>(&driver, id, target, timeout).await
    }
}

#[async_trait]
impl Describe<SyncJob> for DtsService {
    async fn describe(&self, id: &str) -> Result<SyncJob> {
        self.describe_job(id).await
    }
}

/// One status-driving session; carries the job's sync direction.
struct JobDriver<'a> {
    service: &'a DtsService,
    direction: Option<&'a str>,
    timeout: Duration,
}

#[async_trait]
impl Describe<SyncJob> for JobDriver<'_> {
    async fn describe(&self, id: &str) -> Result<SyncJob> {
        self.service.describe_job(id).await
    }
}

#[async_trait]
impl Transitions<SyncJob> for JobDriver<'_> {
    fn table(&self) -> &TransitionTable {
        &self.service.transitions
    }

    async fn fire(&self, id: &str, edge: &Edge) -> Result<()> {
        self.service
            .ctx
            .request(DTS, edge.action)
            .id(id)
            .param("DtsJobId", id)
            .with_region()
            .param_opt("SynchronizationDirection", self.direction)
            .policy(mutate_policy(self.timeout))
            .send()
            .await?;
        Ok(())
    }
}
