//! `db_database` resource

use super::service::{Database, RdsService};
use crate::common::{DEFAULT_INTERVAL_SHORT, RDS, mutate_policy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stratus_cloud::{
    CloudError, Context, Lifecycle, OPERATION_DENIED_DB_STATUS, ResourceData, Result, WaitSpec,
    composite_id, parse_composite_id, wait_for_state,
};

const DATABASE_GONE: &[&str] = &["InvalidDBName.NotFound", "InvalidDBInstanceId.NotFound"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub instance_id: String,
    pub name: String,
    pub character_set: String,
    pub description: Option<String>,
    pub status: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            instance_id: String::new(),
            name: String::new(),
            character_set: "utf8".to_string(),
            description: None,
            status: None,
        }
    }
}

pub struct DbDatabase {
    service: RdsService,
}

impl DbDatabase {
    pub fn new(ctx: Context) -> Self {
        Self {
            service: RdsService::new(ctx),
        }
    }
}

#[async_trait]
impl Lifecycle for DbDatabase {
    type Config = DatabaseConfig;

    fn resource_type(&self) -> &'static str {
        "db_database"
    }

    async fn create(&self, data: &mut ResourceData<DatabaseConfig>) -> Result<()> {
        let c = &data.config;
        let timeout = data.timeouts.create;
        let id = composite_id(&[c.instance_id.as_str(), c.name.as_str()]);

        self.service
            .context()
            .request(RDS, "CreateDatabase")
            .id(&id)
            .with_region()
            .param("DBInstanceId", c.instance_id.as_str())
            .param("DBName", c.name.as_str())
            .param("CharacterSetName", c.character_set.as_str())
            .param_opt("DBDescription", c.description.as_deref())
            .with_source_ip()
            .expect(OPERATION_DENIED_DB_STATUS)
            .policy(mutate_policy(timeout))
            .send()
            .await?;

        tracing::info!(id = %id, "created database");
        data.set_id(id.clone());

        let spec = WaitSpec::new(["Running"], timeout).interval(DEFAULT_INTERVAL_SHORT);
        wait_for_state::<Database, _>(&self.service, &id, &spec).await?;
        self.read(data).await
    }

    async fn read(&self, data: &mut ResourceData<DatabaseConfig>) -> Result<()> {
        let Some(id) = data.id().map(str::to_string) else {
            return Ok(());
        };

        match self.service.describe_database(&id).await {
            Ok(db) => {
                let parts = parse_composite_id(&id, 2)?;
                let c = &mut data.config;
                c.instance_id = parts[0].to_string();
                c.name = db.name;
                if let Some(charset) = db.character_set_name {
                    c.character_set = charset;
                }
                c.description = db.description.filter(|d| !d.is_empty());
                c.status = Some(db.status);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!(id = %id, "database is gone, removing from state");
                data.clear_id();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn update(&self, data: &mut ResourceData<DatabaseConfig>) -> Result<()> {
        let id = data
            .id()
            .map(str::to_string)
            .ok_or_else(|| CloudError::InvalidConfig("update called without an id".to_string()))?;
        let parts = parse_composite_id(&id, 2)?;

        if data.has_change(|c| &c.character_set)
            || data.config.instance_id != parts[0]
            || data.config.name != parts[1]
        {
            return Err(CloudError::InvalidConfig(format!(
                "database {id}: instance, name and character set are fixed at creation"
            )));
        }

        if data.has_change(|c| &c.description) {
            self.service
                .context()
                .request(RDS, "ModifyDBDescription")
                .id(&id)
                .with_region()
                .param("DBInstanceId", parts[0])
                .param("DBName", parts[1])
                .param("DBDescription", data.config.description.clone().unwrap_or_default())
                .with_source_ip()
                .expect(OPERATION_DENIED_DB_STATUS)
                .policy(mutate_policy(data.timeouts.update))
                .send()
                .await?;
        }

        self.read(data).await
    }

    async fn delete(&self, data: &mut ResourceData<DatabaseConfig>) -> Result<()> {
        let Some(id) = data.id().map(str::to_string) else {
            return Ok(());
        };
        let parts = parse_composite_id(&id, 2)?;
        let timeout = data.timeouts.delete;

        let result = self
            .service
            .context()
            .request(RDS, "DeleteDatabase")
            .id(&id)
            .with_region()
            .param("DBInstanceId", parts[0])
            .param("DBName", parts[1])
            .with_source_ip()
            .expect(OPERATION_DENIED_DB_STATUS)
            .policy(mutate_policy(timeout))
            .send()
            .await;

        match result {
            Ok(_) => {
                let spec = WaitSpec::deleted(timeout).interval(DEFAULT_INTERVAL_SHORT);
                wait_for_state::<Database, _>(&self.service, &id, &spec).await?;
            }
            Err(e) if e.has_code(DATABASE_GONE) => {
                tracing::warn!(id = %id, "database already deleted");
            }
            Err(e) => return Err(e),
        }
        data.clear_id();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_character_set_defaults_to_utf8() {
        let config: DatabaseConfig = serde_json::from_value(json!({
            "instance_id": "rm-1",
            "name": "app"
        }))
        .unwrap();
        assert_eq!(config.character_set, "utf8");
    }

    #[test]
    fn test_new_database_only_sees_declared_fields_as_changed() {
        let data = ResourceData::new(DatabaseConfig {
            instance_id: "rm-1".into(),
            name: "app".into(),
            ..Default::default()
        });
        assert!(!data.has_change(|c| &c.character_set));
        assert!(!data.has_change(|c| &c.description));
        assert!(data.has_change(|c| &c.name));
    }
}
