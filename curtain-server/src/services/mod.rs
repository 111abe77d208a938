mod background;
mod bus;
mod curtain_service;
mod mqtt_bridge;
mod recorder;

pub use background::*;
pub use bus::*;
pub use curtain_service::*;
pub use mqtt_bridge::*;
pub use recorder::*;
