//! In-memory serial device for tests.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::error::LinkError;
use crate::transport::{LinkConfig, SerialConnector, SerialLink};

const IDLE_POLL: Duration = Duration::from_millis(5);

enum Incoming {
    Data(Vec<u8>),
    Fail(io::ErrorKind),
}

#[derive(Default)]
struct DeviceState {
    incoming: Mutex<VecDeque<Incoming>>,
    arrived: Condvar,
    written: Mutex<Vec<u8>>,
    fail_writes: AtomicBool,
    clears: AtomicUsize,
}

/// Test double for the board on the other end of the cable. Cheap to clone;
/// all clones and all links share the same buffers.
#[derive(Clone, Default)]
pub struct MockDevice {
    state: Arc<DeviceState>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(&self) -> Box<dyn SerialLink> {
        Box::new(MockLink {
            state: self.state.clone(),
        })
    }

    /// Queues a line for the reader, terminator added.
    pub fn push_line(&self, line: &str) {
        self.push_bytes(format!("{line}\n").as_bytes());
    }

    pub fn push_bytes(&self, bytes: &[u8]) {
        self.push(Incoming::Data(bytes.to_vec()));
    }

    /// The next read after the queued data fails with `kind`.
    pub fn push_read_error(&self, kind: io::ErrorKind) {
        self.push(Incoming::Fail(kind));
    }

    fn push(&self, incoming: Incoming) {
        self.state
            .incoming
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(incoming);
        self.state.arrived.notify_all();
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn written(&self) -> String {
        let written = self.state.written.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&written).into_owned()
    }

    pub fn written_lines(&self) -> Vec<String> {
        self.written().lines().map(str::to_string).collect()
    }

    pub fn clear_count(&self) -> usize {
        self.state.clears.load(Ordering::SeqCst)
    }
}

struct MockLink {
    state: Arc<DeviceState>,
}

impl Read for MockLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let incoming = self.state.incoming.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut incoming, _) = self
            .state
            .arrived
            .wait_timeout_while(incoming, IDLE_POLL, |queue| queue.is_empty())
            .unwrap_or_else(PoisonError::into_inner);

        match incoming.pop_front() {
            Some(Incoming::Data(mut bytes)) => {
                let count = bytes.len().min(buf.len());
                buf[..count].copy_from_slice(&bytes[..count]);

                if count < bytes.len() {
                    incoming.push_front(Incoming::Data(bytes.split_off(count)));
                }

                Ok(count)
            }
            Some(Incoming::Fail(kind)) => Err(io::Error::new(kind, "mock read failure")),
            None => Err(io::Error::new(io::ErrorKind::TimedOut, "mock idle")),
        }
    }
}

impl Write for MockLink {
    /// One byte per call, so unsynchronized writers would interleave.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "mock write timeout"));
        }

        let Some(byte) = buf.first() else {
            return Ok(0);
        };

        self.state
            .written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(*byte);
        std::thread::yield_now();

        Ok(1)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialLink for MockLink {
    fn clear_buffers(&mut self) -> io::Result<()> {
        self.state.clears.fetch_add(1, Ordering::SeqCst);
        self.state
            .incoming
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    fn try_clone_link(&self) -> io::Result<Box<dyn SerialLink>> {
        Ok(Box::new(MockLink {
            state: self.state.clone(),
        }))
    }
}

/// Hands out links to a [`MockDevice`], or fails to open on request.
#[derive(Clone, Default)]
pub struct MockConnector {
    device: MockDevice,
    fail_open: Arc<AtomicBool>,
    opens: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new(device: MockDevice) -> Self {
        Self {
            device,
            ..Default::default()
        }
    }

    pub fn device(&self) -> &MockDevice {
        &self.device
    }

    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl SerialConnector for MockConnector {
    fn open(&self, config: &LinkConfig) -> Result<Box<dyn SerialLink>, LinkError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        if self.fail_open.load(Ordering::SeqCst) {
            return Err(LinkError::Open {
                port: config.port.clone(),
                source: serialport::Error::new(serialport::ErrorKind::NoDevice, "mock port missing"),
            });
        }

        Ok(self.device.link())
    }
}
