use std::sync::Arc;

use serde::Serialize;
use sqlx::Error;
use time::OffsetDateTime;

use crate::configs::Storage;
use crate::repositories::{CurtainOperationRepository, ErrorLogRepository, LightReadingRepository};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub light_readings: u64,
    pub operations: u64,
    pub errors: u64,
}

/// Retention and housekeeping across all history tables.
#[derive(Clone)]
pub struct MaintenanceRepository {
    storage: Arc<Storage>,
}

impl MaintenanceRepository {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub async fn cleanup_before(&self, cutoff: OffsetDateTime) -> Result<CleanupReport, Error> {
        let readings = LightReadingRepository::new(self.storage.clone());
        let operations = CurtainOperationRepository::new(self.storage.clone());
        let errors = ErrorLogRepository::new(self.storage.clone());

        let mut tx = self.storage.get_pool().begin().await?;
        let report = CleanupReport {
            light_readings: readings.delete_before(cutoff, &mut tx).await?,
            operations: operations.delete_before(cutoff, &mut tx).await?,
            errors: errors.delete_before(cutoff, &mut tx).await?,
        };
        tx.commit().await?;

        Ok(report)
    }

    pub async fn vacuum(&self) -> Result<(), Error> {
        sqlx::query("VACUUM").execute(self.storage.get_pool()).await?;

        tracing::info!("database vacuumed");
        Ok(())
    }
}
