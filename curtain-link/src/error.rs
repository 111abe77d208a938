use std::io;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Device not connected")]
    NotConnected,

    #[error("Failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Serial transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Invalid parameter for {command}: {value}")]
    InvalidParameter { command: &'static str, value: String },
}

impl LinkError {
    /// True for failures that tore the connection down.
    pub fn is_transport(&self) -> bool {
        matches!(self, LinkError::Open { .. } | LinkError::Transport(_))
    }
}

/// Malformed payload for a known message type. The line is dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Invalid integer for {kind}: {value:?}")]
    InvalidInteger { kind: &'static str, value: String },
}
