use std::sync::Arc;

use sqlx::{Error, Pool, Sqlite, Transaction};
use time::OffsetDateTime;

use crate::configs::Storage;
use crate::models::ErrorLog;

#[derive(Clone)]
pub struct ErrorLogRepository {
    storage: Arc<Storage>,
}

impl ErrorLogRepository {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub fn get_pool(&self) -> &Pool<Sqlite> {
        self.storage.get_pool()
    }
}

impl ErrorLogRepository {
    pub async fn create(
        &self,
        error_type: &str,
        error_message: &str,
        component: &str,
        transaction: &mut Transaction<'_, Sqlite>,
    ) -> Result<i64, Error> {
        let id = sqlx::query(
            r#"
            INSERT INTO error_log (timestamp, error_type, error_message, component, severity)
            VALUES ($1, $2, $3, $4, 'error')
            "#,
        )
        .bind(OffsetDateTime::now_utc())
        .bind(error_type)
        .bind(error_message)
        .bind(component)
        .execute(&mut **transaction)
        .await?
        .last_insert_rowid();

        Ok(id)
    }

    pub async fn find_since(&self, since: OffsetDateTime, limit: i64) -> Result<Vec<ErrorLog>, Error> {
        let errors: Vec<ErrorLog> = sqlx::query_as(
            r#"
            SELECT * FROM error_log
            WHERE timestamp > $1
            ORDER BY timestamp DESC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(self.storage.get_pool())
        .await?;

        Ok(errors)
    }

    pub async fn delete_before(
        &self,
        cutoff: OffsetDateTime,
        transaction: &mut Transaction<'_, Sqlite>,
    ) -> Result<u64, Error> {
        let deleted = sqlx::query("DELETE FROM error_log WHERE timestamp < $1")
            .bind(cutoff)
            .execute(&mut **transaction)
            .await?
            .rows_affected();

        Ok(deleted)
    }
}
