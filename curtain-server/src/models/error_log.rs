use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::Table;

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct ErrorLog {
    pub id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub error_type: String,
    pub error_message: String,
    /// `arduino`, `mqtt`, `database` or `api`
    pub component: String,
    pub severity: String,
}

#[derive(Clone)]
pub struct ErrorLogTable;

impl Table for ErrorLogTable {
    fn name(&self) -> &'static str {
        "error_log"
    }

    fn create(&self) -> String {
        String::from(
            r#"
            CREATE TABLE IF NOT EXISTS error_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TIMESTAMP NOT NULL,
                error_type TEXT NOT NULL,
                error_message TEXT NOT NULL,
                component TEXT NOT NULL,
                severity TEXT NOT NULL DEFAULT 'error'
            );
            CREATE INDEX IF NOT EXISTS idx_errors_timestamp ON error_log (timestamp);
            "#,
        )
    }

    fn dispose(&self) -> String {
        String::from("DROP TABLE IF EXISTS error_log;")
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec![]
    }
}
