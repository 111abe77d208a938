//! Serial link to the curtain controller board.
//!
//! Bytes from the port are framed into lines, decoded into
//! [`DeviceMessage`]s, folded into the [`DeviceStatus`] and handed to the
//! [`CallbackRouter`]. Outbound [`Command`]s go through a single writer lock.

mod command;
mod controller;
mod error;
mod framer;
mod message;
mod router;
mod status;
mod transport;
mod writer;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use command::Command;
pub use controller::{DeviceController, LinkState};
pub use error::{DecodeError, LinkError};
pub use message::{CalibrationUpdate, DecodedMessage, DeviceMessage, MessageKind};
pub use router::{CallbackRouter, Dispatch, Handler};
pub use status::{DeviceStatus, StatusModel};
pub use transport::{LinkConfig, SerialConnector, SerialLink, SerialPortConnector, available_ports};
