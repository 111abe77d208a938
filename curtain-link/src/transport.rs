use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};

use crate::error::LinkError;

#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Bounds every blocking read, and so how fast the reader notices a stop.
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Applied once after opening, while the board resets.
    pub reset_delay: Duration,
    /// Before the mode-sync command of the handshake.
    pub handshake_delay: Duration,
    /// Between the mode-sync and status-request commands.
    pub handshake_gap: Duration,
    /// How long `disconnect` waits for the reader before abandoning it.
    pub shutdown_timeout: Duration,
}

impl LinkConfig {
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
            ..Default::default()
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: String::from("/dev/ttyACM0"),
            baud_rate: 115_200,
            read_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(1),
            reset_delay: Duration::from_secs(2),
            handshake_delay: Duration::from_millis(500),
            handshake_gap: Duration::from_millis(200),
            shutdown_timeout: Duration::from_secs(2),
        }
    }
}

/// A bidirectional byte stream to the device.
pub trait SerialLink: Read + Write + Send {
    /// Discards anything buffered in either direction.
    fn clear_buffers(&mut self) -> io::Result<()>;

    /// A second handle on the same port, used by the reader thread.
    fn try_clone_link(&self) -> io::Result<Box<dyn SerialLink>>;
}

pub trait SerialConnector: Send + Sync {
    fn open(&self, config: &LinkConfig) -> Result<Box<dyn SerialLink>, LinkError>;
}

/// Opens real ports through the `serialport` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialPortConnector;

impl SerialConnector for SerialPortConnector {
    fn open(&self, config: &LinkConfig) -> Result<Box<dyn SerialLink>, LinkError> {
        tracing::info!("attempting to connect to {} at {} baud", config.port, config.baud_rate);

        let port = serialport::new(&config.port, config.baud_rate)
            .timeout(config.write_timeout)
            .open()
            .map_err(|source| LinkError::Open {
                port: config.port.clone(),
                source,
            })?;

        Ok(Box::new(PortLink {
            port,
            read_timeout: config.read_timeout,
        }))
    }
}

struct PortLink {
    port: Box<dyn SerialPort>,
    read_timeout: Duration,
}

impl Read for PortLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for PortLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl SerialLink for PortLink {
    fn clear_buffers(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::All).map_err(io::Error::from)
    }

    fn try_clone_link(&self) -> io::Result<Box<dyn SerialLink>> {
        let mut port = self.port.try_clone().map_err(io::Error::from)?;
        // Each handle keeps its own timeout: the clone is the reader side.
        port.set_timeout(self.read_timeout).map_err(io::Error::from)?;

        Ok(Box::new(PortLink {
            port,
            read_timeout: self.read_timeout,
        }))
    }
}

/// Names of the serial ports present on this machine.
pub fn available_ports() -> Result<Vec<String>, LinkError> {
    let ports = serialport::available_ports().map_err(|e| LinkError::Transport(e.into()))?;

    Ok(ports.into_iter().map(|port| port.port_name).collect())
}
