use std::future::Future;
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::runtime::Handle;

use crate::configs::Storage;
use crate::models::Trigger;
use crate::repositories::{CurtainOperationRepository, ErrorLogRepository, LightReadingRepository};

/// Fire-and-forget history writes. Called from the serial reader thread, so
/// implementations must not block; failures are logged, never returned.
pub trait Recorder: Send + Sync {
    fn insert_light_reading(&self, raw_value: i32);

    fn log_operation(&self, operation: &str, trigger: Trigger, light_level_before: Option<i32>);

    fn log_error(&self, error_type: &str, message: &str, component: &str);
}

/// Writes to SQLite on the given runtime.
pub struct SqliteRecorder {
    storage: Arc<Storage>,
    runtime: Handle,
}

impl SqliteRecorder {
    pub fn new(storage: Arc<Storage>, runtime: Handle) -> Self {
        Self { storage, runtime }
    }

    fn spawn<F, Fut>(&self, what: &'static str, job: F)
    where
        F: FnOnce(Arc<Storage>) -> Fut,
        Fut: Future<Output = Result<(), sqlx::Error>> + Send + 'static,
    {
        let job = job(self.storage.clone());

        self.runtime.spawn(async move {
            if let Err(e) = job.await {
                tracing::error!("failed to {}: {}", what, e);
            }
        });
    }
}

impl Recorder for SqliteRecorder {
    fn insert_light_reading(&self, raw_value: i32) {
        self.spawn("save light reading", move |storage| async move {
            let repository = LightReadingRepository::new(storage.clone());

            let mut tx = storage.get_pool().begin().await?;
            repository.create(raw_value, OffsetDateTime::now_utc(), &mut tx).await?;
            tx.commit().await?;

            tracing::debug!("inserted light reading: {}", raw_value);
            Ok(())
        });
    }

    fn log_operation(&self, operation: &str, trigger: Trigger, light_level_before: Option<i32>) {
        let operation = operation.to_string();

        self.spawn("log operation", move |storage| async move {
            let repository = CurtainOperationRepository::new(storage.clone());

            let mut tx = storage.get_pool().begin().await?;
            repository.create(&operation, trigger, light_level_before, &mut tx).await?;
            tx.commit().await?;

            tracing::info!("logged operation: {} ({})", operation, trigger.as_str());
            Ok(())
        });
    }

    fn log_error(&self, error_type: &str, message: &str, component: &str) {
        let (error_type, message, component) = (error_type.to_string(), message.to_string(), component.to_string());

        self.spawn("log error", move |storage| async move {
            let repository = ErrorLogRepository::new(storage.clone());

            let mut tx = storage.get_pool().begin().await?;
            repository.create(&error_type, &message, &component, &mut tx).await?;
            tx.commit().await?;

            tracing::debug!("logged error: {} in {}", error_type, component);
            Ok(())
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::tests::setup_test_db;

    #[tokio::test]
    async fn test_writes_from_foreign_thread() {
        let storage = setup_test_db().await;
        let recorder = Arc::new(SqliteRecorder::new(storage.clone(), Handle::current()));

        let writer = recorder.clone();
        std::thread::spawn(move || {
            writer.insert_light_reading(640);
            writer.log_operation("open", Trigger::Mqtt, Some(640));
            writer.log_error("arduino_error", "STALL", "arduino");
        })
        .join()
        .unwrap();

        let since = OffsetDateTime::now_utc() - time::Duration::hours(1);
        let readings = LightReadingRepository::new(storage.clone());
        let operations = CurtainOperationRepository::new(storage.clone());
        let errors = ErrorLogRepository::new(storage.clone());

        for _ in 0..100 {
            if readings.find_since(since, 10).await.unwrap().len() == 1
                && operations.find_since(since, 10).await.unwrap().len() == 1
                && errors.find_since(since, 10).await.unwrap().len() == 1
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        panic!("recorder writes did not land");
    }
}
