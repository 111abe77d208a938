use std::sync::Arc;

use sqlx::{Error, Pool, Sqlite, Transaction};
use time::OffsetDateTime;

use crate::configs::Storage;
use crate::models::SystemConfig;

pub const DARK_THRESHOLD_KEY: &str = "threshold_dark";
pub const BRIGHT_THRESHOLD_KEY: &str = "threshold_bright";

#[derive(Clone)]
pub struct SystemConfigRepository {
    storage: Arc<Storage>,
}

impl SystemConfigRepository {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub fn get_pool(&self) -> &Pool<Sqlite> {
        self.storage.get_pool()
    }
}

impl SystemConfigRepository {
    pub async fn find_by_key(&self, key: &str) -> Result<Option<SystemConfig>, Error> {
        let setting: Option<SystemConfig> =
            sqlx::query_as("SELECT * FROM system_config WHERE setting_key = $1")
                .bind(key)
                .fetch_optional(self.storage.get_pool())
                .await?;

        Ok(setting)
    }

    /// The stored value parsed as an integer, if present and well formed.
    pub async fn find_integer(&self, key: &str) -> Result<Option<i64>, Error> {
        let setting = self.find_by_key(key).await?;

        Ok(setting.and_then(|s| s.setting_value.parse().ok()))
    }

    pub async fn upsert(
        &self,
        key: &str,
        value: &str,
        data_type: &str,
        transaction: &mut Transaction<'_, Sqlite>,
    ) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO system_config (setting_key, setting_value, data_type, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (setting_key) DO UPDATE SET
                setting_value = excluded.setting_value,
                data_type = excluded.data_type,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(data_type)
        .bind(OffsetDateTime::now_utc())
        .execute(&mut **transaction)
        .await?;

        Ok(())
    }
}
