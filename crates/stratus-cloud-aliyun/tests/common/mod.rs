#![allow(dead_code)]

//! In-memory DTS and RDS endpoints for handler tests.
//!
//! Entities move through intermediate states: each one carries an optional
//! `next` status that replaces the current one after it has been described
//! once, so every wait in a handler sees at least one non-target poll.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use stratus_cloud::{Api, CloudError, Context, Params, Result, Transport};

pub fn api_error(code: &str) -> CloudError {
    CloudError::Api {
        code: code.to_string(),
        message: format!("{code} (fake)"),
        request_id: Some("fake-request".to_string()),
        http_status: Some(400),
    }
}

#[derive(Debug, Clone)]
pub struct Status {
    pub current: String,
    pub next: Option<String>,
}

impl Status {
    fn settled(s: &str) -> Self {
        Self {
            current: s.to_string(),
            next: None,
        }
    }

    fn moving(now: &str, then: &str) -> Self {
        Self {
            current: now.to_string(),
            next: Some(then.to_string()),
        }
    }

    /// Report the current status, then advance.
    fn observe(&mut self) -> String {
        let seen = self.current.clone();
        if let Some(next) = self.next.take() {
            self.current = next;
        }
        seen
    }
}

#[derive(Debug, Clone)]
pub struct FakeJob {
    pub status: Status,
    pub name: String,
    pub instance_id: String,
    pub db_list: String,
    pub direction: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FakeInstance {
    pub status: Status,
    pub engine: String,
    pub storage_type: String,
}

#[derive(Debug, Clone)]
pub struct FakeDatabase {
    pub status: Status,
    pub description: String,
    pub charset: String,
    /// account -> privilege as the engine reports it
    pub grants: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct FakeAccount {
    pub status: Status,
    pub description: String,
    pub account_type: String,
    pub password: String,
}

#[derive(Default)]
pub struct CloudState {
    pub jobs: HashMap<String, FakeJob>,
    pub instances: HashMap<String, FakeInstance>,
    pub databases: HashMap<(String, String), FakeDatabase>,
    pub accounts: HashMap<(String, String), FakeAccount>,
    pub backup: HashMap<String, Params>,
    /// Statuses a newly configured job reports, before and after its first describe.
    pub configure_status: Option<(String, String)>,
    next_job: u32,
}

#[derive(Default)]
pub struct FakeCloud {
    pub state: Mutex<CloudState>,
    calls: Mutex<Vec<(String, Params)>>,
    failures: Mutex<HashMap<String, VecDeque<CloudError>>>,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn context(self: &Arc<Self>) -> Context {
        Context::new("cn-hangzhou", self.clone()).with_source_ip("10.0.0.1")
    }

    pub fn with_instance(self: &Arc<Self>, id: &str, engine: &str, storage_type: &str) -> Arc<Self> {
        self.state.lock().unwrap().instances.insert(
            id.to_string(),
            FakeInstance {
                status: Status::settled("Running"),
                engine: engine.to_string(),
                storage_type: storage_type.to_string(),
            },
        );
        self.clone()
    }

    pub fn with_job(self: &Arc<Self>, id: &str, status: &str) -> Arc<Self> {
        self.state.lock().unwrap().jobs.insert(
            id.to_string(),
            FakeJob {
                status: Status::settled(status),
                name: "orders".to_string(),
                instance_id: "dtsi-existing".to_string(),
                db_list: "{}".to_string(),
                direction: None,
            },
        );
        self.clone()
    }

    pub fn with_database(self: &Arc<Self>, instance: &str, name: &str) -> Arc<Self> {
        self.state.lock().unwrap().databases.insert(
            (instance.to_string(), name.to_string()),
            FakeDatabase {
                status: Status::settled("Running"),
                description: String::new(),
                charset: "utf8".to_string(),
                grants: BTreeMap::new(),
            },
        );
        self.clone()
    }

    pub fn with_account(self: &Arc<Self>, instance: &str, name: &str) -> Arc<Self> {
        self.state.lock().unwrap().accounts.insert(
            (instance.to_string(), name.to_string()),
            FakeAccount {
                status: Status::settled("Available"),
                description: String::new(),
                account_type: "Normal".to_string(),
                password: String::new(),
            },
        );
        self.clone()
    }

    pub fn on_configure(&self, now: &str, then: &str) {
        self.state.lock().unwrap().configure_status = Some((now.to_string(), then.to_string()));
    }

    /// Make the next `times` calls of `action` fail with `code`.
    pub fn fail(&self, action: &str, code: &str, times: usize) {
        let mut failures = self.failures.lock().unwrap();
        let queue = failures.entry(action.to_string()).or_default();
        for _ in 0..times {
            queue.push_back(api_error(code));
        }
    }

    /// Actions invoked so far, describes excluded.
    pub fn mutations(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(action, _)| action.clone())
            .filter(|a| !a.starts_with("Describe"))
            .collect()
    }

    pub fn count(&self, action: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, _)| a == action)
            .count()
    }

    /// Params of the most recent call to `action`.
    pub fn last_params(&self, action: &str) -> Option<Params> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(a, _)| a == action)
            .map(|(_, p)| p.clone())
    }

    pub fn job_status(&self, id: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .jobs
            .get(id)
            .map(|j| j.status.current.clone())
    }

    fn handle(&self, action: &str, p: &Params) -> Result<Value> {
        let mut st = self.state.lock().unwrap();
        match action {
            // DTS
            "ConfigureDtsJob" => {
                st.next_job += 1;
                let id = format!("dtsjob-{}", st.next_job);
                let instance_id = text(p, "DtsInstanceId")
                    .unwrap_or_else(|| format!("dtsi-{}", st.next_job));
                let status = st
                    .configure_status
                    .as_ref()
                    .map(|(now, then)| Status::moving(now, then))
                    .unwrap_or_else(|| Status::moving("Prechecking", "NotStarted"));
                st.jobs.insert(
                    id.clone(),
                    FakeJob {
                        status,
                        name: text(p, "DtsJobName").unwrap_or_default(),
                        instance_id: instance_id.clone(),
                        db_list: text(p, "DbList").unwrap_or_default(),
                        direction: text(p, "SynchronizationDirection"),
                    },
                );
                Ok(json!({"DtsJobId": id, "DtsInstanceId": instance_id, "Success": true}))
            }
            "DescribeDtsJobDetail" => {
                let id = text(p, "DtsJobId").unwrap_or_default();
                let job = st
                    .jobs
                    .get_mut(&id)
                    .ok_or_else(|| api_error("Forbidden.InstanceNotFound"))?;
                let status = job.status.observe();
                Ok(json!({
                    "Status": status,
                    "DtsJobName": job.name,
                    "DtsInstanceID": job.instance_id,
                    "DbObject": job.db_list,
                    "SynchronizationDirection": job.direction,
                    "MigrationMode": {
                        "DataInitialization": true,
                        "DataSynchronization": "true",
                        "StructureInitialization": false
                    },
                    "SourceEndpoint": {"EngineName": "PostgreSQL", "Port": 5432, "UserName": "sync"},
                    "DestinationEndpoint": {"EngineName": "MySQL", "InstanceID": "rm-dest"}
                }))
            }
            "StartDtsJob" => {
                let job = job_mut(&mut st, p)?;
                job.status = Status::moving("Starting", "Synchronizing");
                Ok(json!({"Success": true}))
            }
            "SuspendDtsJob" => {
                let job = job_mut(&mut st, p)?;
                if job.status.current != "Synchronizing" {
                    return Err(api_error("InvalidJobStatus"));
                }
                job.status = Status::settled("Suspending");
                Ok(json!({"Success": true}))
            }
            "ModifyDtsJobName" => {
                let job = job_mut(&mut st, p)?;
                job.name = text(p, "DtsJobName").unwrap_or_default();
                Ok(json!({"Success": true}))
            }
            "ModifyDtsJobPassword" | "TransferInstanceClass" => {
                job_mut(&mut st, p)?;
                Ok(json!({"Success": true}))
            }
            "ModifyDtsJob" => {
                let instance_id = text(p, "DtsInstanceId").unwrap_or_default();
                let job = st
                    .jobs
                    .values_mut()
                    .find(|j| j.instance_id == instance_id)
                    .ok_or_else(|| api_error("Forbidden.InstanceNotFound"))?;
                job.db_list = text(p, "DbList").unwrap_or_default();
                Ok(json!({"Success": true}))
            }
            "DeleteDtsJob" => {
                let id = text(p, "DtsJobId").unwrap_or_default();
                st.jobs
                    .remove(&id)
                    .ok_or_else(|| api_error("Forbidden.InstanceNotFound"))?;
                Ok(json!({"Success": true}))
            }

            // RDS
            "DescribeDBInstanceAttribute" => {
                let id = text(p, "DBInstanceId").unwrap_or_default();
                let instance = st
                    .instances
                    .get_mut(&id)
                    .ok_or_else(|| api_error("InvalidDBInstanceId.NotFound"))?;
                let status = instance.status.observe();
                Ok(json!({"Items": {"DBInstanceAttribute": [{
                    "DBInstanceId": id,
                    "DBInstanceStatus": status,
                    "Engine": instance.engine,
                    "DBInstanceStorageType": instance.storage_type,
                    "Category": "HighAvailability"
                }]}}))
            }
            "CreateDatabase" => {
                let key = key(p, "DBName");
                require_instance(&st, &key.0)?;
                st.databases.insert(
                    key,
                    FakeDatabase {
                        status: Status::moving("Creating", "Running"),
                        description: text(p, "DBDescription").unwrap_or_default(),
                        charset: text(p, "CharacterSetName").unwrap_or_default(),
                        grants: BTreeMap::new(),
                    },
                );
                Ok(json!({"RequestId": "r"}))
            }
            "DescribeDatabases" => {
                let key = key(p, "DBName");
                require_instance(&st, &key.0)?;
                let list = match st.databases.get_mut(&key) {
                    Some(db) => {
                        let status = db.status.observe();
                        let grants: Vec<Value> = db
                            .grants
                            .iter()
                            .map(|(a, pr)| json!({"Account": a, "AccountPrivilege": pr}))
                            .collect();
                        vec![json!({
                            "DBName": key.1,
                            "DBStatus": status,
                            "DBDescription": db.description,
                            "CharacterSetName": db.charset,
                            "Accounts": {"AccountPrivilegeInfo": grants}
                        })]
                    }
                    None => Vec::new(),
                };
                Ok(json!({"Databases": {"Database": list}}))
            }
            "ModifyDBDescription" => {
                let key = key(p, "DBName");
                let db = st
                    .databases
                    .get_mut(&key)
                    .ok_or_else(|| api_error("InvalidDBName.NotFound"))?;
                db.description = text(p, "DBDescription").unwrap_or_default();
                Ok(json!({}))
            }
            "DeleteDatabase" => {
                let key = key(p, "DBName");
                st.databases
                    .remove(&key)
                    .ok_or_else(|| api_error("InvalidDBName.NotFound"))?;
                Ok(json!({}))
            }
            "CreateAccount" => {
                let key = key(p, "AccountName");
                require_instance(&st, &key.0)?;
                st.accounts.insert(
                    key,
                    FakeAccount {
                        status: Status::moving("Unavailable", "Available"),
                        description: text(p, "AccountDescription").unwrap_or_default(),
                        account_type: text(p, "AccountType").unwrap_or_else(|| "Normal".into()),
                        password: text(p, "AccountPassword").unwrap_or_default(),
                    },
                );
                Ok(json!({}))
            }
            "DescribeAccounts" => {
                let key = key(p, "AccountName");
                require_instance(&st, &key.0)?;
                let privileges: Vec<Value> = st
                    .databases
                    .iter()
                    .filter(|((inst, _), _)| *inst == key.0)
                    .filter_map(|((_, db), fake)| {
                        fake.grants
                            .get(&key.1)
                            .map(|pr| json!({"DBName": db, "AccountPrivilege": pr}))
                    })
                    .collect();
                let list = match st.accounts.get_mut(&key) {
                    Some(account) => vec![json!({
                        "AccountName": key.1,
                        "AccountStatus": account.status.observe(),
                        "AccountDescription": account.description,
                        "AccountType": account.account_type,
                        "DBInstanceId": key.0,
                        "DatabasePrivileges": {"DatabasePrivilege": privileges}
                    })],
                    None => Vec::new(),
                };
                Ok(json!({"Accounts": {"DBInstanceAccount": list}}))
            }
            "ModifyAccountDescription" => {
                let account = account_mut(&mut st, p)?;
                account.description = text(p, "AccountDescription").unwrap_or_default();
                Ok(json!({}))
            }
            "ResetAccountPassword" => {
                let account = account_mut(&mut st, p)?;
                account.password = text(p, "AccountPassword").unwrap_or_default();
                account.status = Status::moving("Unavailable", "Available");
                Ok(json!({}))
            }
            "DeleteAccount" => {
                let key = key(p, "AccountName");
                st.accounts
                    .remove(&key)
                    .ok_or_else(|| api_error("InvalidAccountName.NotFound"))?;
                Ok(json!({}))
            }
            "GrantAccountPrivilege" => {
                let key = key(p, "DBName");
                let engine = st
                    .instances
                    .get(&key.0)
                    .map(|i| i.engine.clone())
                    .ok_or_else(|| api_error("InvalidDBInstanceId.NotFound"))?;
                let account = text(p, "AccountName").unwrap_or_default();
                let mut privilege = text(p, "AccountPrivilege").unwrap_or_default();
                if engine == "PostgreSQL" && privilege == "DBOwner" {
                    privilege = "ALL".to_string();
                }
                let db = st
                    .databases
                    .get_mut(&key)
                    .ok_or_else(|| api_error("InvalidDB.NotFound"))?;
                db.grants.insert(account, privilege);
                Ok(json!({}))
            }
            "RevokeAccountPrivilege" => {
                let key = key(p, "DBName");
                let account = text(p, "AccountName").unwrap_or_default();
                let db = st
                    .databases
                    .get_mut(&key)
                    .ok_or_else(|| api_error("InvalidDB.NotFound"))?;
                db.grants.remove(&account);
                Ok(json!({}))
            }
            "ModifyBackupPolicy" => {
                let id = text(p, "DBInstanceId").unwrap_or_default();
                let instance = st
                    .instances
                    .get_mut(&id)
                    .ok_or_else(|| api_error("InvalidDBInstanceId.NotFound"))?;
                instance.status = Status::moving("BackupPolicyModifying", "Running");
                let stored = st.backup.entry(id).or_default();
                for (k, v) in p {
                    stored.insert(k.clone(), v.clone());
                }
                Ok(json!({}))
            }
            "DescribeBackupPolicy" => {
                let id = text(p, "DBInstanceId").unwrap_or_default();
                require_instance(&st, &id)?;
                let stored = st.backup.get(&id).cloned().unwrap_or_default();
                let field = |k: &str| stored.get(k).cloned().unwrap_or(Value::Null);
                Ok(json!({
                    "PreferredBackupTime": field("PreferredBackupTime"),
                    "PreferredBackupPeriod": field("PreferredBackupPeriod"),
                    "BackupRetentionPeriod": field("BackupRetentionPeriod"),
                    "EnableBackupLog": field("EnableBackupLog"),
                    "LogBackupRetentionPeriod": field("LogBackupRetentionPeriod"),
                    "LocalLogRetentionHours": field("LocalLogRetentionHours"),
                    "LogBackupLocalRetentionNumber": field("LogBackupLocalRetentionNumber")
                }))
            }
            other => Err(api_error(&format!("UnsupportedOperation.{other}"))),
        }
    }
}

#[async_trait]
impl Transport for FakeCloud {
    async fn call(&self, _api: Api, action: &str, params: &Params) -> Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((action.to_string(), params.clone()));

        let injected = self
            .failures
            .lock()
            .unwrap()
            .get_mut(action)
            .and_then(VecDeque::pop_front);
        if let Some(err) = injected {
            return Err(err);
        }

        self.handle(action, params)
    }
}

fn text(p: &Params, key: &str) -> Option<String> {
    match p.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn key(p: &Params, name_key: &str) -> (String, String) {
    (
        text(p, "DBInstanceId").unwrap_or_default(),
        text(p, name_key).unwrap_or_default(),
    )
}

fn require_instance(st: &CloudState, id: &str) -> Result<()> {
    if st.instances.contains_key(id) {
        Ok(())
    } else {
        Err(api_error("InvalidDBInstanceId.NotFound"))
    }
}

fn job_mut<'a>(st: &'a mut CloudState, p: &Params) -> Result<&'a mut FakeJob> {
    let id = text(p, "DtsJobId").unwrap_or_default();
    st.jobs
        .get_mut(&id)
        .ok_or_else(|| api_error("Forbidden.InstanceNotFound"))
}

fn account_mut<'a>(st: &'a mut CloudState, p: &Params) -> Result<&'a mut FakeAccount> {
    let key = key(p, "AccountName");
    st.accounts
        .get_mut(&key)
        .ok_or_else(|| api_error("InvalidAccountName.NotFound"))
}
