use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::Table;

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct CurtainOperation {
    pub id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// `open`, `close`, `auto_opening` or `auto_closing`
    pub operation: String,
    pub trigger: String,
    pub light_level_before: Option<i32>,
    pub light_level_after: Option<i32>,
    pub duration_ms: Option<i64>,
    pub success: bool,
    pub error_message: Option<String>,
}

/// What caused an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    Api,
    Mqtt,
    AutoDark,
    AutoBright,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Api => "api",
            Trigger::Mqtt => "mqtt",
            Trigger::AutoDark => "auto_dark",
            Trigger::AutoBright => "auto_bright",
        }
    }
}

#[derive(Clone)]
pub struct CurtainOperationTable;

impl Table for CurtainOperationTable {
    fn name(&self) -> &'static str {
        "curtain_operations"
    }

    fn create(&self) -> String {
        String::from(
            r#"
            CREATE TABLE IF NOT EXISTS curtain_operations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TIMESTAMP NOT NULL,
                operation TEXT NOT NULL,
                trigger TEXT NOT NULL,
                light_level_before INTEGER,
                light_level_after INTEGER,
                duration_ms INTEGER,
                success BOOLEAN NOT NULL DEFAULT 1,
                error_message TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_operations_timestamp ON curtain_operations (timestamp);
            "#,
        )
    }

    fn dispose(&self) -> String {
        String::from("DROP TABLE IF EXISTS curtain_operations;")
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec![]
    }
}
