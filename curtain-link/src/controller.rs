use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use serde::Serialize;

use crate::command::Command;
use crate::error::LinkError;
use crate::framer::LineFramer;
use crate::message::DeviceMessage;
use crate::router::CallbackRouter;
use crate::status::{DeviceStatus, StatusModel};
use crate::transport::{LinkConfig, SerialConnector, SerialLink};
use crate::writer::{CommandWriter, WriteFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Reading,
}

#[derive(Debug, Clone, Copy)]
struct Session {
    state: LinkState,
    /// Bumped on every successful open.
    epoch: u64,
}

/// State touched by both the reader thread and callers.
struct Shared {
    session: Mutex<Session>,
    status: StatusModel,
    writer: CommandWriter,
    router: Arc<CallbackRouter>,
}

impl Shared {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_live(&self, epoch: u64) -> bool {
        let session = self.session();
        session.epoch == epoch && session.state != LinkState::Disconnected
    }

    /// Tears down connection `epoch` after a transport error. Only the first
    /// caller for a given connection gets `true`.
    fn fail(&self, epoch: u64) -> bool {
        {
            let mut session = self.session();
            if session.epoch != epoch || session.state == LinkState::Disconnected {
                return false;
            }
            session.state = LinkState::Disconnected;
        }

        self.writer.detach(epoch);
        self.status.mark_disconnected();

        true
    }

    fn send(&self, command: &Command) -> Result<(), LinkError> {
        match self.writer.send(command) {
            Ok(()) => Ok(()),
            Err(WriteFailure::NotConnected) => Err(LinkError::NotConnected),
            Err(WriteFailure::Io { epoch, source }) => {
                if self.fail(epoch) {
                    tracing::error!("error sending command {}: {}", command.name(), source);
                }
                Err(LinkError::Transport(source))
            }
        }
    }

    fn process_line(&self, line: &str) {
        tracing::debug!("received: {}", line);

        let message = match DeviceMessage::decode_line(line) {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("dropping {:?}: {}", line, e);
                return;
            }
        };

        match &message {
            DeviceMessage::Position(position) => tracing::info!("position update: {}", position),
            DeviceMessage::Motor(motor) => tracing::info!("motor status: {}", motor),
            DeviceMessage::Mode(mode) => tracing::info!("device mode update: {}", mode),
            DeviceMessage::Error(error) => tracing::error!("device error: {}", error),
            DeviceMessage::Ready(version) => tracing::info!("device ready: {}", version),
            DeviceMessage::Pong => tracing::debug!("received PONG"),
            _ => {}
        }

        self.status.apply(&message);
        self.router.dispatch(&message);
    }
}

struct ReaderHandle {
    stop: Arc<AtomicBool>,
    exited: mpsc::Receiver<()>,
    thread: JoinHandle<()>,
}

impl ReaderHandle {
    fn is_active(&self) -> bool {
        !self.thread.is_finished()
    }
}

/// Signals the reader's exit even if a handler panics through it.
struct ExitSignal(mpsc::Sender<()>);

impl Drop for ExitSignal {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

/// Owns the serial session: connect, background reader, handshake,
/// command sending and disconnect.
///
/// ```text
/// Disconnected -> Connecting -> Connected -> Reading -> Disconnected
/// ```
///
/// Any transport error drops back to `Disconnected` while the last-known
/// [`DeviceStatus`] is kept. Reconnecting is left to the caller.
pub struct DeviceController {
    config: LinkConfig,
    connector: Box<dyn SerialConnector>,
    shared: Arc<Shared>,
    reader: Mutex<Option<ReaderHandle>>,
    /// Serializes connect and disconnect against each other.
    lifecycle: Mutex<()>,
}

impl DeviceController {
    pub fn new(config: LinkConfig, connector: impl SerialConnector + 'static) -> Self {
        let shared = Arc::new(Shared {
            session: Mutex::new(Session {
                state: LinkState::Disconnected,
                epoch: 0,
            }),
            status: StatusModel::new(&config.port),
            writer: CommandWriter::new(),
            router: Arc::new(CallbackRouter::new()),
        });

        Self {
            config,
            connector: Box::new(connector),
            shared,
            reader: Mutex::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn router(&self) -> &Arc<CallbackRouter> {
        &self.shared.router
    }

    pub fn state(&self) -> LinkState {
        self.shared.session().state
    }

    pub fn status(&self) -> DeviceStatus {
        self.shared.status.snapshot()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.status.is_connected() && self.shared.writer.is_attached()
    }

    /// Opens the port, starts the reader and runs the handshake.
    /// Connecting while already connected is a no-op.
    pub fn connect(&self) -> Result<(), LinkError> {
        let _lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);

        {
            let mut session = self.shared.session();
            if session.state != LinkState::Disconnected {
                tracing::debug!("connect requested while {:?}", session.state);
                return Ok(());
            }
            session.state = LinkState::Connecting;
        }

        // A reader left over from a failed connection must be gone before
        // a new one starts.
        self.stop_reader();

        let link = match self.open_link() {
            Ok(link) => link,
            Err(e) => {
                tracing::error!("failed to connect to {}: {}", self.config.port, e);
                self.shared.session().state = LinkState::Disconnected;
                self.shared.status.mark_disconnected();
                return Err(e);
            }
        };

        let epoch = {
            let mut session = self.shared.session();
            session.epoch += 1;
            session.state = LinkState::Connected;
            session.epoch
        };
        self.shared.writer.attach(epoch, link);
        self.shared.status.mark_connected(&self.config.port);

        tracing::info!("connected to device on {}", self.config.port);

        if let Err(e) = self.start_reading() {
            self.shared.fail(epoch);
            return Err(e);
        }

        self.handshake()
    }

    fn open_link(&self) -> Result<Box<dyn SerialLink>, LinkError> {
        let mut link = self.connector.open(&self.config)?;

        // The board resets when the port opens.
        thread::sleep(self.config.reset_delay);
        link.clear_buffers()?;

        Ok(link)
    }

    /// Forces the device into manual mode, then asks for a full report.
    fn handshake(&self) -> Result<(), LinkError> {
        thread::sleep(self.config.handshake_delay);
        self.shared.send(&Command::ManualMode)?;
        thread::sleep(self.config.handshake_gap);
        self.shared.send(&Command::GetStatus)?;

        tracing::info!("device synchronized to manual mode");
        Ok(())
    }

    /// Starts the background reader. Returns `false` if one is already
    /// running for the current connection.
    pub fn start_reading(&self) -> Result<bool, LinkError> {
        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);

        if reader.as_ref().is_some_and(ReaderHandle::is_active) {
            tracing::warn!("read thread already running");
            return Ok(false);
        }

        let (epoch, link) = self.shared.writer.clone_link()?;

        {
            let mut session = self.shared.session();
            if session.epoch != epoch || session.state == LinkState::Disconnected {
                return Err(LinkError::NotConnected);
            }
            session.state = LinkState::Reading;
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (exit_tx, exited) = mpsc::channel();

        let thread = thread::Builder::new()
            .name(String::from("serial-reader"))
            .spawn({
                let shared = self.shared.clone();
                let stop = stop.clone();
                move || {
                    let _exit = ExitSignal(exit_tx);
                    read_loop(&shared, link, epoch, &stop);
                }
            })
            .map_err(LinkError::Transport)?;

        *reader = Some(ReaderHandle { stop, exited, thread });

        tracing::info!("serial read thread started");
        Ok(true)
    }

    /// Sends `command`, blocking while another sender holds the port.
    pub fn send(&self, command: &Command) -> Result<(), LinkError> {
        self.shared.send(command)
    }

    /// Stops the reader, closes the port and marks the device disconnected.
    /// Disconnecting twice is harmless.
    pub fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);

        let epoch = {
            let mut session = self.shared.session();
            session.state = LinkState::Disconnected;
            session.epoch
        };

        self.stop_reader();

        if self.shared.writer.detach(epoch) {
            tracing::info!("serial connection closed");
        }
        self.shared.status.mark_disconnected();
    }

    fn stop_reader(&self) {
        let Some(handle) = self.reader.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            return;
        };

        handle.stop.store(true, Ordering::Release);

        match handle.exited.recv_timeout(self.config.shutdown_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.thread.join().is_err() {
                    tracing::error!("serial read thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "serial read thread did not stop within {:?}, abandoning it",
                    self.config.shutdown_timeout
                );
            }
        }
    }
}

impl Drop for DeviceController {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn read_loop(shared: &Shared, link: Box<dyn SerialLink>, epoch: u64, stop: &AtomicBool) {
    let mut framer = LineFramer::new(link);

    while !stop.load(Ordering::Acquire) && shared.is_live(epoch) {
        match framer.next_line() {
            Ok(Some(line)) => {
                if stop.load(Ordering::Acquire) || !shared.is_live(epoch) {
                    break;
                }
                shared.process_line(&line);
            }
            Ok(None) => {}
            Err(e) => {
                if !stop.load(Ordering::Acquire) && shared.fail(epoch) {
                    tracing::error!("serial read error: {}", e);
                }
                break;
            }
        }
    }

    tracing::debug!("serial read thread exiting");
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Mutex as StdMutex;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::message::MessageKind;
    use crate::mock::{MockConnector, MockDevice};

    fn test_config() -> LinkConfig {
        LinkConfig {
            port: String::from("/dev/mock0"),
            read_timeout: Duration::from_millis(5),
            reset_delay: Duration::ZERO,
            handshake_delay: Duration::ZERO,
            handshake_gap: Duration::ZERO,
            shutdown_timeout: Duration::from_secs(1),
            ..Default::default()
        }
    }

    fn wait_until(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    fn connected() -> (DeviceController, MockDevice) {
        let device = MockDevice::new();
        let controller = DeviceController::new(test_config(), MockConnector::new(device.clone()));
        controller.connect().unwrap();
        (controller, device)
    }

    fn record(controller: &DeviceController, kind: MessageKind) -> Arc<StdMutex<Vec<DeviceMessage>>> {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        controller.router().register(kind, move |message| {
            sink.lock().unwrap().push(message.clone());
            Ok(())
        });
        seen
    }

    #[test]
    fn test_send_before_connect_is_rejected() {
        let device = MockDevice::new();
        let controller = DeviceController::new(test_config(), MockConnector::new(device.clone()));

        assert!(matches!(controller.send(&Command::Ping), Err(LinkError::NotConnected)));
        assert_eq!(device.written(), "");
    }

    #[test]
    fn test_connect_runs_handshake() {
        let (controller, device) = connected();

        assert_eq!(controller.state(), LinkState::Reading);
        assert!(controller.is_connected());
        assert_eq!(device.clear_count(), 1);
        assert_eq!(device.written_lines(), vec!["MANUAL_MODE", "GET_STATUS"]);

        let status = controller.status();
        assert!(status.connected);
        assert_eq!(status.port, "/dev/mock0");
        assert!(status.last_seen.is_some());
    }

    #[test]
    fn test_connect_is_idempotent() {
        let device = MockDevice::new();
        let connector = MockConnector::new(device.clone());
        let controller = DeviceController::new(test_config(), connector.clone());

        controller.connect().unwrap();
        controller.connect().unwrap();

        assert_eq!(connector.open_count(), 1);
        assert_eq!(device.written_lines().len(), 2);
    }

    #[test]
    fn test_start_reading_twice_is_noop() {
        let (controller, _device) = connected();

        assert!(!controller.start_reading().unwrap());
    }

    #[test]
    fn test_open_failure_leaves_disconnected() {
        let connector = MockConnector::new(MockDevice::new());
        connector.fail_open(true);
        let controller = DeviceController::new(test_config(), connector);

        let error = controller.connect().unwrap_err();
        assert!(matches!(error, LinkError::Open { .. }));
        assert_eq!(controller.state(), LinkState::Disconnected);
        assert!(!controller.status().connected);
    }

    #[test]
    fn test_light_dispatch() {
        let (controller, device) = connected();
        let seen = record(&controller, MessageKind::Light);

        device.push_line("LIGHT:abc");
        device.push_line("LIGHT:512");

        assert!(wait_until(|| !seen.lock().unwrap().is_empty()));
        assert_eq!(*seen.lock().unwrap(), vec![DeviceMessage::Light(512)]);
    }

    #[test]
    fn test_mode_updates_in_order() {
        let (controller, device) = connected();
        let seen = record(&controller, MessageKind::Mode);

        device.push_line("MODE:AUTO");
        device.push_line("MODE:Manual");

        assert!(wait_until(|| seen.lock().unwrap().len() == 2));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![DeviceMessage::Mode("auto".into()), DeviceMessage::Mode("manual".into())]
        );
    }

    #[test]
    fn test_noise_does_not_touch_status() {
        let (controller, device) = connected();
        let seen = record(&controller, MessageKind::Pong);
        let before = controller.status();

        device.push_line("booting firmware");
        device.push_line("PONG:");

        assert!(wait_until(|| seen.lock().unwrap().len() == 1));
        let after = controller.status();
        assert_eq!(after.firmware_version, before.firmware_version);
        assert_eq!(after.calibrated, before.calibrated);
    }

    #[test]
    fn test_calibration_updates_status() {
        let (controller, device) = connected();
        let seen = record(&controller, MessageKind::Calibration);

        device.push_line("CALIBRATION:YES,MIN:100,MAX:900");
        device.push_line("CALIBRATION:MIN:50");

        assert!(wait_until(|| seen.lock().unwrap().len() == 2));
        let status = controller.status();
        assert!(status.calibrated);
        assert_eq!((status.light_min, status.light_max), (50, 900));
    }

    #[test]
    fn test_failing_handler_keeps_reader_alive() {
        let (controller, device) = connected();
        controller.router().register(MessageKind::Light, |_| anyhow::bail!("database down"));
        let seen = record(&controller, MessageKind::Pong);

        device.push_line("LIGHT:1");
        device.push_line("PONG:");

        assert!(wait_until(|| seen.lock().unwrap().len() == 1));
        assert_eq!(controller.state(), LinkState::Reading);
    }

    #[test]
    fn test_disconnect_keeps_last_known_status() {
        let (controller, device) = connected();
        let seen = record(&controller, MessageKind::Calibration);

        device.push_line("VERSION:2.0.1");
        device.push_line("CALIBRATION:YES,MIN:120,MAX:880");
        assert!(wait_until(|| seen.lock().unwrap().len() == 1));

        controller.disconnect();
        controller.disconnect();

        let status = controller.status();
        assert_eq!(controller.state(), LinkState::Disconnected);
        assert!(!status.connected);
        assert_eq!(status.firmware_version, "2.0.1");
        assert_eq!((status.light_min, status.light_max), (120, 880));
        assert!(matches!(controller.send(&Command::Ping), Err(LinkError::NotConnected)));
    }

    #[test]
    fn test_read_error_stops_dispatch() {
        let (controller, device) = connected();
        let seen = record(&controller, MessageKind::Light);

        device.push_line("LIGHT:1");
        device.push_read_error(io::ErrorKind::BrokenPipe);
        device.push_line("LIGHT:2");

        assert!(wait_until(|| controller.state() == LinkState::Disconnected));
        thread::sleep(Duration::from_millis(30));

        assert_eq!(*seen.lock().unwrap(), vec![DeviceMessage::Light(1)]);
        assert!(!controller.status().connected);
        assert!(matches!(controller.send(&Command::Ping), Err(LinkError::NotConnected)));
    }

    #[test]
    fn test_write_error_marks_disconnected() {
        let (controller, device) = connected();
        device.fail_writes(true);

        let error = controller.send(&Command::OpenCurtain).unwrap_err();

        assert!(matches!(error, LinkError::Transport(_)));
        assert_eq!(controller.state(), LinkState::Disconnected);
        assert!(!controller.status().connected);
        assert!(matches!(controller.send(&Command::Ping), Err(LinkError::NotConnected)));
    }

    #[test]
    fn test_reconnect_after_failure() {
        let device = MockDevice::new();
        let connector = MockConnector::new(device.clone());
        let controller = DeviceController::new(test_config(), connector.clone());
        controller.connect().unwrap();

        device.push_read_error(io::ErrorKind::BrokenPipe);
        assert!(wait_until(|| controller.state() == LinkState::Disconnected));

        controller.connect().unwrap();
        assert_eq!(connector.open_count(), 2);
        assert_eq!(controller.state(), LinkState::Reading);

        let seen = record(&controller, MessageKind::Light);
        device.push_line("LIGHT:42");
        assert!(wait_until(|| seen.lock().unwrap().len() == 1));
    }

    #[test]
    fn test_stuck_reader_is_abandoned_on_disconnect() {
        let device = MockDevice::new();
        let config = LinkConfig {
            shutdown_timeout: Duration::from_millis(200),
            ..test_config()
        };
        let controller = DeviceController::new(config, MockConnector::new(device.clone()));
        controller.connect().unwrap();

        let entered = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        {
            let (entered, finished) = (entered.clone(), finished.clone());
            controller.router().register(MessageKind::Light, move |_| {
                entered.store(true, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(1500));
                finished.store(true, Ordering::SeqCst);
                Ok(())
            });
        }

        device.push_line("LIGHT:7");
        assert!(wait_until(|| entered.load(Ordering::SeqCst)));

        let started = Instant::now();
        controller.disconnect();
        let elapsed = started.elapsed();

        assert!(elapsed < Duration::from_millis(1000), "disconnect took {elapsed:?}");
        assert_eq!(controller.state(), LinkState::Disconnected);
        assert!(!controller.status().connected);
        assert!(!finished.load(Ordering::SeqCst));

        controller.connect().unwrap();
        assert_eq!(controller.state(), LinkState::Reading);

        let deadline = Instant::now() + Duration::from_secs(3);
        while !finished.load(Ordering::SeqCst) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(finished.load(Ordering::SeqCst));
        thread::sleep(Duration::from_millis(50));

        assert_eq!(controller.state(), LinkState::Reading);
        assert!(controller.is_connected());
    }

    #[test]
    fn test_concurrent_sends_do_not_interleave() {
        let (controller, device) = connected();
        let controller = Arc::new(controller);

        let workers: Vec<_> = (0..8)
            .map(|i| {
                let controller = controller.clone();
                thread::spawn(move || {
                    for _ in 0..10 {
                        let command = Command::raw("WORKER", Some(&format!("{i}-abcdefgh"))).unwrap();
                        controller.send(&command).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let lines = device.written_lines();
        let sent: Vec<_> = lines.iter().filter(|l| l.starts_with("WORKER")).collect();
        assert_eq!(sent.len(), 80);
        for line in sent {
            let (_, param) = line.split_once(':').unwrap();
            let (index, tail) = param.split_once('-').unwrap();
            assert!(index.parse::<u8>().unwrap() < 8);
            assert_eq!(tail, "abcdefgh");
        }
    }
}
