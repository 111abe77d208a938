mod curtain_operation;
mod error_log;
mod light_reading;
mod maintenance;
mod system_config;

pub use curtain_operation::CurtainOperationRepository;
pub use error_log::ErrorLogRepository;
pub use light_reading::LightReadingRepository;
pub use maintenance::{CleanupReport, MaintenanceRepository};
pub use system_config::{BRIGHT_THRESHOLD_KEY, DARK_THRESHOLD_KEY, SystemConfigRepository};
