use std::sync::Arc;

use sqlx::{Error, Pool, Sqlite, Transaction};
use time::OffsetDateTime;

use crate::configs::Storage;
use crate::models::{CurtainOperation, Trigger};

#[derive(Clone)]
pub struct CurtainOperationRepository {
    storage: Arc<Storage>,
}

impl CurtainOperationRepository {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub fn get_pool(&self) -> &Pool<Sqlite> {
        self.storage.get_pool()
    }
}

impl CurtainOperationRepository {
    pub async fn create(
        &self,
        operation: &str,
        trigger: Trigger,
        light_level_before: Option<i32>,
        transaction: &mut Transaction<'_, Sqlite>,
    ) -> Result<i64, Error> {
        let id = sqlx::query(
            r#"
            INSERT INTO curtain_operations (timestamp, operation, trigger, light_level_before, success)
            VALUES ($1, $2, $3, $4, 1)
            "#,
        )
        .bind(OffsetDateTime::now_utc())
        .bind(operation)
        .bind(trigger.as_str())
        .bind(light_level_before)
        .execute(&mut **transaction)
        .await?
        .last_insert_rowid();

        Ok(id)
    }

    pub async fn find_since(&self, since: OffsetDateTime, limit: i64) -> Result<Vec<CurtainOperation>, Error> {
        let operations: Vec<CurtainOperation> = sqlx::query_as(
            r#"
            SELECT * FROM curtain_operations
            WHERE timestamp > $1
            ORDER BY timestamp DESC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(self.storage.get_pool())
        .await?;

        Ok(operations)
    }

    pub async fn delete_before(
        &self,
        cutoff: OffsetDateTime,
        transaction: &mut Transaction<'_, Sqlite>,
    ) -> Result<u64, Error> {
        let deleted = sqlx::query("DELETE FROM curtain_operations WHERE timestamp < $1")
            .bind(cutoff)
            .execute(&mut **transaction)
            .await?
            .rows_affected();

        Ok(deleted)
    }
}
