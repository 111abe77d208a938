use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::configs::{Settings, Storage};
use crate::repositories::{CleanupReport, MaintenanceRepository};
use crate::services::CurtainService;

const CLEANUP_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Starts the periodic publishers, the auto-mode observer and the daily
/// retention cleanup. Abort the returned handles to stop them.
pub fn spawn_background_tasks(
    service: Arc<CurtainService>,
    storage: Arc<Storage>,
    settings: &Settings,
) -> Vec<JoinHandle<()>> {
    let publish = &settings.mqtt.publish_interval;
    let retention_days = settings.database.retention_days;

    vec![
        every(secs(publish.light), {
            let service = service.clone();
            move || {
                service.publish_light();
                async {}
            }
        }),
        every(secs(publish.heartbeat), {
            let service = service.clone();
            move || {
                service.publish_heartbeat();
                async {}
            }
        }),
        every(secs(publish.status), {
            let service = service.clone();
            move || {
                if let Err(e) = service.publish_status() {
                    tracing::error!("status publish failed: {:#}", e);
                }
                async {}
            }
        }),
        every(secs(settings.curtain.auto_interval_secs), {
            let service = service.clone();
            move || {
                service.auto_mode_check(std::time::Instant::now());
                async {}
            }
        }),
        every(CLEANUP_PERIOD, move || {
            let storage = storage.clone();
            async move {
                cleanup(storage, retention_days).await;
            }
        }),
    ]
}

fn secs(value: u64) -> Duration {
    Duration::from_secs(value.max(1))
}

fn every<F, Fut>(period: Duration, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            interval.tick().await;
            tick().await;
        }
    })
}

/// Deletes history older than `retention_days` and compacts the file.
/// Returns what was deleted, or `None` when the cleanup failed.
pub async fn cleanup(storage: Arc<Storage>, retention_days: u32) -> Option<CleanupReport> {
    let cutoff = OffsetDateTime::now_utc().checked_sub(time::Duration::days(i64::from(retention_days)))?;
    let maintenance = MaintenanceRepository::new(storage);

    let report = match maintenance.cleanup_before(cutoff).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("cleanup failed: {}", e);
            return None;
        }
    };

    tracing::info!(
        "cleanup: deleted {} readings, {} operations, {} errors older than {} days",
        report.light_readings,
        report.operations,
        report.errors,
        retention_days
    );

    if let Err(e) = maintenance.vacuum().await {
        tracing::error!("vacuum failed: {}", e);
    }

    Some(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::LightReadingRepository;
    use crate::tests::setup_test_db;

    #[tokio::test]
    async fn test_cleanup_keeps_recent_history() {
        let storage = setup_test_db().await;
        let repository = LightReadingRepository::new(storage.clone());
        let now = OffsetDateTime::now_utc();

        let mut tx = storage.get_pool().begin().await.unwrap();
        repository.create(100, now - time::Duration::days(45), &mut tx).await.unwrap();
        repository.create(200, now - time::Duration::hours(2), &mut tx).await.unwrap();
        tx.commit().await.unwrap();

        let report = cleanup(storage.clone(), 30).await.unwrap();
        assert_eq!(
            report,
            CleanupReport {
                light_readings: 1,
                operations: 0,
                errors: 0
            }
        );

        let remaining = repository
            .find_since(now - time::Duration::days(365), 10)
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].raw_value, 200);
    }

    #[tokio::test]
    async fn test_cleanup_skips_unrepresentable_cutoff() {
        let storage = setup_test_db().await;

        assert_eq!(cleanup(storage, u32::MAX).await, None);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        assert_eq!(secs(0), Duration::from_secs(1));
        assert_eq!(secs(30), Duration::from_secs(30));
    }
}
