use std::sync::Arc;

use sqlx::{Error, Pool, Sqlite, Transaction};
use time::OffsetDateTime;

use crate::configs::Storage;
use crate::models::{LightReading, LightStatistics};

const DEFAULT_SENSOR: &str = "main";

#[derive(Clone)]
pub struct LightReadingRepository {
    storage: Arc<Storage>,
}

impl LightReadingRepository {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub fn get_pool(&self) -> &Pool<Sqlite> {
        self.storage.get_pool()
    }
}

impl LightReadingRepository {
    pub async fn create(
        &self,
        raw_value: i32,
        timestamp: OffsetDateTime,
        transaction: &mut Transaction<'_, Sqlite>,
    ) -> Result<i64, Error> {
        let id = sqlx::query(
            r#"
            INSERT INTO light_readings (timestamp, raw_value, sensor_id)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(timestamp)
        .bind(raw_value)
        .bind(DEFAULT_SENSOR)
        .execute(&mut **transaction)
        .await?
        .last_insert_rowid();

        Ok(id)
    }

    /// Newest first.
    pub async fn find_since(&self, since: OffsetDateTime, limit: i64) -> Result<Vec<LightReading>, Error> {
        let readings: Vec<LightReading> = sqlx::query_as(
            r#"
            SELECT * FROM light_readings
            WHERE timestamp > $1
            ORDER BY timestamp DESC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(self.storage.get_pool())
        .await?;

        Ok(readings)
    }

    pub async fn statistics_since(&self, since: OffsetDateTime) -> Result<LightStatistics, Error> {
        let statistics: LightStatistics = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) AS count,
                AVG(raw_value) AS average,
                MIN(raw_value) AS minimum,
                MAX(raw_value) AS maximum
            FROM light_readings
            WHERE timestamp > $1
            "#,
        )
        .bind(since)
        .fetch_one(self.storage.get_pool())
        .await?;

        Ok(statistics)
    }

    pub async fn delete_before(
        &self,
        cutoff: OffsetDateTime,
        transaction: &mut Transaction<'_, Sqlite>,
    ) -> Result<u64, Error> {
        let deleted = sqlx::query("DELETE FROM light_readings WHERE timestamp < $1")
            .bind(cutoff)
            .execute(&mut **transaction)
            .await?
            .rows_affected();

        Ok(deleted)
    }
}
