use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::Table;

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct LightReading {
    pub id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// 0-1023 from the device ADC
    pub raw_value: i32,
    pub calibrated_value: Option<f64>,
    pub sensor_id: String,
}

/// Most recent value seen on the serial link.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LightSample {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub raw_value: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, sqlx::FromRow)]
pub struct LightStatistics {
    pub count: i64,
    pub average: Option<f64>,
    pub minimum: Option<i64>,
    pub maximum: Option<i64>,
}

#[derive(Clone)]
pub struct LightReadingTable;

impl Table for LightReadingTable {
    fn name(&self) -> &'static str {
        "light_readings"
    }

    fn create(&self) -> String {
        String::from(
            r#"
            CREATE TABLE IF NOT EXISTS light_readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TIMESTAMP NOT NULL,
                raw_value INTEGER NOT NULL,
                calibrated_value REAL,
                sensor_id TEXT NOT NULL DEFAULT 'main'
            );
            CREATE INDEX IF NOT EXISTS idx_light_timestamp ON light_readings (timestamp);
            "#,
        )
    }

    fn dispose(&self) -> String {
        String::from("DROP TABLE IF EXISTS light_readings;")
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec![]
    }
}
