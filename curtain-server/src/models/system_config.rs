use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::Table;

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct SystemConfig {
    pub setting_key: String,
    pub setting_value: String,
    pub data_type: String,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct SystemConfigTable;

impl Table for SystemConfigTable {
    fn name(&self) -> &'static str {
        "system_config"
    }

    fn create(&self) -> String {
        String::from(
            r#"
            CREATE TABLE IF NOT EXISTS system_config (
                setting_key TEXT PRIMARY KEY,
                setting_value TEXT NOT NULL,
                data_type TEXT NOT NULL DEFAULT 'string',
                updated_at TIMESTAMP NOT NULL
            );
            "#,
        )
    }

    fn dispose(&self) -> String {
        String::from("DROP TABLE IF EXISTS system_config;")
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec![]
    }
}
