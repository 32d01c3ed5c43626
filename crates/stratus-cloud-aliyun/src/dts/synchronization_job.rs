//! `dts_synchronization_job` resource

use super::service::{DtsService, JOB_FAILURE_STATES, SyncJob, normalize_source_engine};
use crate::common::{DTS, ensure_success, mutate_policy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use stratus_cloud::{
    CloudError, Context, Lifecycle, ResourceData, Result, WaitSpec, wait_for_state,
};

const MODIFY_DB_LIST_RETRY_CODES: &[&str] = &[
    "InvalidJobStatus",
    "InvalidTaskStatus",
    "DTS.Msg.OperationDenied.JobStatusModifying",
    "DTS.Msg.ModifyDenied.JobStatusNotRunning",
];

/// Declared configuration of a synchronization job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncJobConfig {
    pub dts_instance_id: String,
    pub dts_job_name: String,
    pub dedicated_cluster_id: Option<String>,
    pub data_check_configure: Option<String>,
    pub checkpoint: Option<String>,
    pub instance_class: Option<String>,
    pub data_initialization: bool,
    pub data_synchronization: bool,
    pub structure_initialization: bool,
    pub synchronization_direction: Option<String>,
    pub db_list: String,
    pub reserve: Option<String>,

    pub source_endpoint_instance_type: String,
    pub source_endpoint_engine_name: String,
    pub source_endpoint_instance_id: Option<String>,
    pub source_endpoint_region: Option<String>,
    pub source_endpoint_ip: Option<String>,
    pub source_endpoint_port: Option<String>,
    pub source_endpoint_oracle_sid: Option<String>,
    pub source_endpoint_database_name: Option<String>,
    pub source_endpoint_user_name: Option<String>,
    pub source_endpoint_password: Option<String>,
    pub source_endpoint_owner_id: Option<String>,
    pub source_endpoint_role: Option<String>,
    pub source_endpoint_vswitch_id: Option<String>,

    pub destination_endpoint_instance_type: String,
    pub destination_endpoint_engine_name: String,
    pub destination_endpoint_instance_id: Option<String>,
    pub destination_endpoint_region: Option<String>,
    pub destination_endpoint_ip: Option<String>,
    pub destination_endpoint_port: Option<String>,
    pub destination_endpoint_database_name: Option<String>,
    pub destination_endpoint_user_name: Option<String>,
    pub destination_endpoint_password: Option<String>,
    pub destination_endpoint_oracle_sid: Option<String>,
    pub destination_endpoint_owner_id: Option<String>,
    pub destination_endpoint_role: Option<String>,

    pub dts_bis_label: Option<String>,
    pub delay_notice: Option<bool>,
    pub delay_phone: Option<String>,
    pub delay_rule_time: Option<String>,
    pub error_notice: Option<bool>,
    pub error_phone: Option<String>,

    /// `Synchronizing` or `Suspending`
    pub status: Option<String>,
}

impl SyncJobConfig {
    /// Project a describe snapshot onto the fields the API reports back.
    /// Credentials, notification settings and the instance class are kept.
    fn refresh_from(&mut self, job: SyncJob) {
        let source = job.source_endpoint;
        let dest = job.destination_endpoint;
        let mode = job.migration_mode;

        self.checkpoint = job.checkpoint;
        self.data_initialization = mode.data_initialization.unwrap_or_default();
        self.data_synchronization = mode.data_synchronization.unwrap_or_default();
        self.structure_initialization = mode.structure_initialization.unwrap_or_default();
        self.db_list = job.db_object.unwrap_or_default();
        self.synchronization_direction = job.synchronization_direction;
        if let Some(instance_id) = job.dts_instance_id {
            self.dts_instance_id = instance_id;
        }
        self.dts_job_name = job.dts_job_name.unwrap_or_default();
        self.status = Some(job.status);

        self.destination_endpoint_database_name = dest.database_name;
        self.destination_endpoint_engine_name = dest.engine_name.unwrap_or_default();
        self.destination_endpoint_ip = dest.ip;
        self.destination_endpoint_instance_id = dest.instance_id;
        self.destination_endpoint_instance_type = dest.instance_type.unwrap_or_default();
        self.destination_endpoint_oracle_sid = dest.oracle_sid;
        self.destination_endpoint_port = dest.port;
        self.destination_endpoint_region = dest.region;
        self.destination_endpoint_user_name = dest.user_name;

        self.source_endpoint_database_name = source.database_name;
        self.source_endpoint_engine_name = source
            .engine_name
            .as_deref()
            .map(normalize_source_engine)
            .unwrap_or_default();
        self.source_endpoint_ip = source.ip;
        self.source_endpoint_instance_id = source.instance_id;
        self.source_endpoint_instance_type = source.instance_type.unwrap_or_default();
        self.source_endpoint_oracle_sid = source.oracle_sid;
        self.source_endpoint_owner_id = source.aliyun_uid;
        self.source_endpoint_port = source.port;
        self.source_endpoint_region = source.region;
        self.source_endpoint_role = source.role_name;
        self.source_endpoint_user_name = source.user_name;
    }
}

/// Handler for DTS synchronization jobs
pub struct DtsSynchronizationJob {
    service: DtsService,
}

impl DtsSynchronizationJob {
    pub fn new(ctx: Context) -> Self {
        Self {
            service: DtsService::new(ctx),
        }
    }

    fn ctx(&self) -> &Context {
        self.service.context()
    }

    async fn drive(&self, id: &str, config: &SyncJobConfig, timeout: Duration) -> Result<()> {
        match config.status.as_deref() {
            Some(target) => {
                self.service
                    .drive_status(id, target, config.synchronization_direction.as_deref(), timeout)
                    .await
            }
            None => Ok(()),
        }
    }

    /// Restore the declared status after a call that may have stopped the job.
    /// Statuses no transition leads to (`NotStarted`) are left alone.
    async fn redrive(&self, id: &str, config: &SyncJobConfig, timeout: Duration) -> Result<()> {
        match config.status.as_deref() {
            Some(target) if !self.service.is_drivable(target) => {
                tracing::debug!(id, status = target, "status is not drivable, skipping re-drive");
                Ok(())
            }
            _ => self.drive(id, config, timeout).await,
        }
    }

    async fn modify_password(
        &self,
        id: &str,
        endpoint: &str,
        user_name: Option<&str>,
        password: Option<&str>,
        timeout: Duration,
    ) -> Result<()> {
        let action = "ModifyDtsJobPassword";
        let response = self
            .ctx()
            .request(DTS, action)
            .id(id)
            .param("DtsJobId", id)
            .with_region()
            .param("Endpoint", endpoint)
            .param_opt("Password", password)
            .param_opt("UserName", user_name)
            .policy(mutate_policy(timeout))
            .send()
            .await?;
        ensure_success(action, id, &response)
    }
}

#[async_trait]
impl Lifecycle for DtsSynchronizationJob {
    type Config = SyncJobConfig;

    fn resource_type(&self) -> &'static str {
        "dts_synchronization_job"
    }

    async fn create(&self, data: &mut ResourceData<SyncJobConfig>) -> Result<()> {
        let action = "ConfigureDtsJob";
        let c = &data.config;
        let timeout = data.timeouts.create;

        let response = self
            .ctx()
            .request(DTS, action)
            .id(&c.dts_job_name)
            .param_opt("DtsInstanceId", non_empty(&c.dts_instance_id))
            .param("DtsJobName", c.dts_job_name.as_str())
            .param_opt("Checkpoint", c.checkpoint.as_deref())
            .param("DataInitialization", c.data_initialization)
            .param("DataSynchronization", c.data_synchronization)
            .param("StructureInitialization", c.structure_initialization)
            .param_opt("SynchronizationDirection", c.synchronization_direction.as_deref())
            .param("DbList", c.db_list.as_str())
            .param_opt("DelayNotice", c.delay_notice)
            .param_opt("DelayPhone", c.delay_phone.as_deref())
            .param_opt("DelayRuleTime", c.delay_rule_time.as_deref())
            .param_opt("DestinationEndpointDataBaseName", c.destination_endpoint_database_name.as_deref())
            .param("DestinationEndpointEngineName", c.destination_endpoint_engine_name.as_str())
            .param_opt("DestinationEndpointIP", c.destination_endpoint_ip.as_deref())
            .param_opt("DestinationEndpointInstanceID", c.destination_endpoint_instance_id.as_deref())
            .param("DestinationEndpointInstanceType", c.destination_endpoint_instance_type.as_str())
            .param_opt("DestinationEndpointOracleSID", c.destination_endpoint_oracle_sid.as_deref())
            .param_opt("DestinationEndpointPassword", c.destination_endpoint_password.as_deref())
            .param_opt("DestinationEndpointPort", c.destination_endpoint_port.as_deref())
            .param_opt("DestinationEndpointRegion", c.destination_endpoint_region.as_deref())
            .param_opt("DestinationEndpointUserName", c.destination_endpoint_user_name.as_deref())
            .param_opt("DestinationEndpointOwnerID", c.destination_endpoint_owner_id.as_deref())
            .param_opt("DestinationEndpointRole", c.destination_endpoint_role.as_deref())
            .param_opt("ErrorNotice", c.error_notice)
            .param_opt("ErrorPhone", c.error_phone.as_deref())
            .param("JobType", "SYNC")
            .with_region()
            .param_opt("Reserve", c.reserve.as_deref())
            .param_opt("SourceEndpointDatabaseName", c.source_endpoint_database_name.as_deref())
            .param("SourceEndpointEngineName", c.source_endpoint_engine_name.as_str())
            .param_opt("SourceEndpointIP", c.source_endpoint_ip.as_deref())
            .param_opt("SourceEndpointInstanceID", c.source_endpoint_instance_id.as_deref())
            .param("SourceEndpointInstanceType", c.source_endpoint_instance_type.as_str())
            .param_opt("SourceEndpointOracleSID", c.source_endpoint_oracle_sid.as_deref())
            .param_opt("SourceEndpointOwnerID", c.source_endpoint_owner_id.as_deref())
            .param_opt("SourceEndpointPassword", c.source_endpoint_password.as_deref())
            .param_opt("SourceEndpointPort", c.source_endpoint_port.as_deref())
            .param_opt("SourceEndpointRegion", c.source_endpoint_region.as_deref())
            .param_opt("SourceEndpointRole", c.source_endpoint_role.as_deref())
            .param_opt("SourceEndpointUserName", c.source_endpoint_user_name.as_deref())
            .param_opt("SourceEndpointVSwitchID", c.source_endpoint_vswitch_id.as_deref())
            .param_opt("DedicatedClusterId", c.dedicated_cluster_id.as_deref())
            .param_opt("DataCheckConfigure", c.data_check_configure.as_deref())
            .param_opt("DtsBisLabel", c.dts_bis_label.as_deref())
            .expect(&["SQLExecuteError"])
            .policy(mutate_policy(timeout))
            .send()
            .await?;

        let job_id = scalar(&response, "DtsJobId").ok_or_else(|| {
            CloudError::malformed(&c.dts_job_name, "$.DtsJobId", "missing job id")
        })?;
        let instance_id = scalar(&response, "DtsInstanceId");

        tracing::info!(id = %job_id, name = %data.config.dts_job_name, "created synchronization job");
        data.set_id(job_id.clone());
        if let Some(instance_id) = instance_id {
            data.config.dts_instance_id = instance_id;
        }

        let spec = WaitSpec::new(["Synchronizing", "NotStarted"], timeout)
            .failures(JOB_FAILURE_STATES.iter().copied())
            .delay(Duration::from_secs(5));
        wait_for_state::<SyncJob, _>(&self.service, &job_id, &spec).await?;

        self.update(data).await
    }

    async fn read(&self, data: &mut ResourceData<SyncJobConfig>) -> Result<()> {
        let Some(id) = data.id().map(str::to_string) else {
            return Ok(());
        };

        match self.service.describe_job(&id).await {
            Ok(job) => {
                data.config.refresh_from(job);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!(id = %id, "synchronization job is gone, removing from state");
                data.clear_id();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn update(&self, data: &mut ResourceData<SyncJobConfig>) -> Result<()> {
        let id = data
            .id()
            .map(str::to_string)
            .ok_or_else(|| CloudError::InvalidConfig("update called without an id".to_string()))?;
        let timeout = data.timeouts.update;
        let is_new = data.is_new();

        if !is_new && data.has_change(|c| &c.dts_job_name) {
            let action = "ModifyDtsJobName";
            let response = self
                .ctx()
                .request(DTS, action)
                .id(&id)
                .param("DtsJobId", id.as_str())
                .param("DtsJobName", data.config.dts_job_name.as_str())
                .with_region()
                .policy(mutate_policy(timeout))
                .send()
                .await?;
            ensure_success(action, &id, &response)?;
        }

        if !is_new && data.has_change(|c| &c.source_endpoint_password) {
            let c = &data.config;
            self.modify_password(
                &id,
                "src",
                c.source_endpoint_user_name.as_deref(),
                c.source_endpoint_password.as_deref(),
                timeout,
            )
            .await?;
            self.redrive(&id, c, timeout).await?;
        }

        if !is_new && data.has_change(|c| &c.destination_endpoint_password) {
            let c = &data.config;
            self.modify_password(
                &id,
                "dest",
                c.destination_endpoint_user_name.as_deref(),
                c.destination_endpoint_password.as_deref(),
                timeout,
            )
            .await?;
            self.redrive(&id, c, timeout).await?;
        }

        if data.has_change(|c| &c.instance_class) {
            let action = "TransferInstanceClass";
            let response = self
                .ctx()
                .request(DTS, action)
                .id(&id)
                .param("DtsJobId", id.as_str())
                .param_opt("InstanceClass", data.config.instance_class.as_deref())
                .with_region()
                .param("OrderType", "UPGRADE")
                .policy(mutate_policy(timeout))
                .send()
                .await?;
            ensure_success(action, &id, &response)?;

            let spec = WaitSpec::new(["Synchronizing", "Suspending", "NotStarted"], timeout)
                .failures(JOB_FAILURE_STATES.iter().copied());
            wait_for_state::<SyncJob, _>(&self.service, &id, &spec).await?;
        }

        if data.has_change(|c| &c.status) {
            self.drive(&id, &data.config, timeout).await?;
        }

        if !is_new && data.has_change(|c| &c.db_list) {
            let action = "ModifyDtsJob";
            let c = &data.config;
            let response = self
                .ctx()
                .request(DTS, action)
                .id(&id)
                .param("DtsInstanceId", c.dts_instance_id.as_str())
                .with_region()
                .param_opt("DbList", non_empty(&c.db_list))
                .expect(MODIFY_DB_LIST_RETRY_CODES)
                .policy(mutate_policy(timeout))
                .send()
                .await?;
            ensure_success(action, &id, &response)?;
            self.redrive(&id, c, timeout).await?;
        }

        self.read(data).await
    }

    async fn delete(&self, data: &mut ResourceData<SyncJobConfig>) -> Result<()> {
        let Some(id) = data.id().map(str::to_string) else {
            return Ok(());
        };

        let result = self
            .ctx()
            .request(DTS, "DeleteDtsJob")
            .id(&id)
            .param("DtsJobId", id.as_str())
            .param_opt("DtsInstanceId", non_empty(&data.config.dts_instance_id))
            .with_region()
            .policy(mutate_policy(data.timeouts.delete))
            .send()
            .await;

        match result {
            Ok(_) => {}
            Err(e) if e.has_code(&["Forbidden.InstanceNotFound"]) => {
                tracing::warn!(id = %id, "synchronization job already deleted");
            }
            Err(e) => return Err(e),
        }
        data.clear_id();
        Ok(())
    }
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

/// Response ids may come back as strings or numbers.
fn scalar(response: &Value, key: &str) -> Option<String> {
    match response.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
