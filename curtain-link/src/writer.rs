use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::command::Command;
use crate::error::LinkError;
use crate::transport::SerialLink;

struct ActiveLink {
    epoch: u64,
    link: Box<dyn SerialLink>,
}

#[derive(Debug)]
pub(crate) enum WriteFailure {
    NotConnected,
    /// Tagged with the connection it happened on.
    Io { epoch: u64, source: io::Error },
}

/// Serializes outbound commands. One lock covers format, write and flush,
/// so concurrent senders never interleave bytes on the wire.
#[derive(Default)]
pub struct CommandWriter {
    active: Mutex<Option<ActiveLink>>,
}

impl CommandWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveLink>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_attached(&self) -> bool {
        self.lock().is_some()
    }

    pub(crate) fn attach(&self, epoch: u64, link: Box<dyn SerialLink>) {
        *self.lock() = Some(ActiveLink { epoch, link });
    }

    /// Drops the link if it still belongs to `epoch`.
    pub(crate) fn detach(&self, epoch: u64) -> bool {
        let mut active = self.lock();

        if active.as_ref().is_some_and(|a| a.epoch == epoch) {
            *active = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn clone_link(&self) -> Result<(u64, Box<dyn SerialLink>), LinkError> {
        let active = self.lock();
        let active = active.as_ref().ok_or(LinkError::NotConnected)?;

        Ok((active.epoch, active.link.try_clone_link()?))
    }

    /// On failure the link is dropped before the lock is released.
    pub(crate) fn send(&self, command: &Command) -> Result<(), WriteFailure> {
        let mut guard = self.lock();

        let Some(active) = guard.as_mut() else {
            tracing::warn!("cannot send command {:?}: not connected", command.name());
            return Err(WriteFailure::NotConnected);
        };

        let frame = command.encode();
        let result = active
            .link
            .write_all(frame.as_bytes())
            .and_then(|_| active.link.flush());

        match result {
            Ok(()) => {
                tracing::debug!("sent command: {}", frame.trim_end());
                Ok(())
            }
            Err(source) => {
                let epoch = active.epoch;
                *guard = None;
                Err(WriteFailure::Io { epoch, source })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDevice;

    #[test]
    fn test_send_without_link() {
        let writer = CommandWriter::new();

        assert!(matches!(writer.send(&Command::Ping), Err(WriteFailure::NotConnected)));
    }

    #[test]
    fn test_send_writes_terminated_line() {
        let device = MockDevice::new();
        let writer = CommandWriter::new();
        writer.attach(1, device.link());

        writer.send(&Command::set_speed(55).unwrap()).unwrap();

        assert_eq!(device.written(), "SET_SPEED:55\n");
    }

    #[test]
    fn test_write_error_detaches_link() {
        let device = MockDevice::new();
        let writer = CommandWriter::new();
        writer.attach(7, device.link());
        device.fail_writes(true);

        match writer.send(&Command::Ping) {
            Err(WriteFailure::Io { epoch, .. }) => assert_eq!(epoch, 7),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!writer.is_attached());
    }

    #[test]
    fn test_detach_ignores_stale_epoch() {
        let device = MockDevice::new();
        let writer = CommandWriter::new();
        writer.attach(2, device.link());

        assert!(!writer.detach(1));
        assert!(writer.detach(2));
        assert!(!writer.is_attached());
    }
}
