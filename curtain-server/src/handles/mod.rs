mod control_handle;
mod curtain_handle;
mod light_handle;
mod system_handle;

pub use control_handle::*;
pub use curtain_handle::*;
pub use light_handle::*;
pub use system_handle::*;

use std::sync::Arc;

use serde::Deserialize;

use crate::errors::{ApiError, CurtainError};
use crate::services::CurtainService;

#[derive(Clone, Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_hours")]
    pub hours: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_hours() -> i64 {
    24
}

fn default_limit() -> i64 {
    1000
}

/// Ten years.
const MAX_HISTORY_HOURS: i64 = 24 * 365 * 10;

impl HistoryQuery {
    pub fn hours(&self) -> i64 {
        self.hours.clamp(0, MAX_HISTORY_HOURS)
    }

    pub fn since(&self) -> time::OffsetDateTime {
        time::OffsetDateTime::now_utc() - time::Duration::hours(self.hours())
    }
}

/// Serial writes block, so they run off the async workers.
async fn run_blocking<T, F>(service: &Arc<CurtainService>, job: F) -> Result<T, ApiError>
where
    F: FnOnce(&CurtainService) -> Result<T, CurtainError> + Send + 'static,
    T: Send + 'static,
{
    let service = service.clone();
    let result = tokio::task::spawn_blocking(move || job(&service))
        .await
        .map_err(anyhow::Error::from)?;

    Ok(result?)
}
