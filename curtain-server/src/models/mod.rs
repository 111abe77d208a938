mod curtain;
mod curtain_operation;
mod error_log;
mod light_reading;
mod status;
mod system_config;

pub use curtain::{CurtainPosition, CurtainState, InvalidValue, MotorState, SystemMode, SystemSettings};
pub use curtain_operation::{CurtainOperation, CurtainOperationTable, Trigger};
pub use error_log::{ErrorLog, ErrorLogTable};
pub use light_reading::{LightReading, LightReadingTable, LightSample, LightStatistics};
pub use status::{MqttStatus, SystemStatus};
pub use system_config::{SystemConfig, SystemConfigTable};

pub trait Table {
    /// The name of the table
    fn name(&self) -> &'static str;

    /// The SQL statement to create the table
    fn create(&self) -> String;

    /// The SQL statement to dispose the table
    fn dispose(&self) -> String;

    /// The dependencies of the table
    fn dependencies(&self) -> Vec<&'static str>;
}
