/// Live serial session — an owned open port with a polling read loop and a
/// mutex-serialized write path.
///
/// # Lifecycle
///
/// `Closed → Opening → Open` happens inside [`SerialSession::open`]; an
/// open failure returns the error with nothing spawned. `Open → Closing →
/// Closed` happens on [`SerialSession::close`] (or drop), and on a fatal
/// read-loop error, which emits [`SessionEvent::Error`] and closes the
/// session terminally — reconnecting is a caller decision, never automatic.
/// The OS handle is released exactly once on every path.
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::TransportError;

/// Interval between polls for available bytes in the read loop.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Upper bound on blocking reads/writes against the OS handle, so the read
/// loop can never wedge on a dead device.
const IO_TIMEOUT: Duration = Duration::from_millis(100);

/// Data chunks queued before the reader blocks. The consumer typically
/// drains once per UI frame; 2 048 chunks is minutes of typical console
/// traffic.
pub const SESSION_CHANNEL_CAPACITY: usize = 2_048;

/// Serial frame parameters. Defaults to 8N1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    One,
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    None,
    Even,
    Odd,
}

impl DataBits {
    fn to_serialport(self) -> serialport::DataBits {
        match self {
            Self::Five => serialport::DataBits::Five,
            Self::Six => serialport::DataBits::Six,
            Self::Seven => serialport::DataBits::Seven,
            Self::Eight => serialport::DataBits::Eight,
        }
    }
}

impl StopBits {
    fn to_serialport(self) -> serialport::StopBits {
        match self {
            Self::One => serialport::StopBits::One,
            Self::Two => serialport::StopBits::Two,
        }
    }
}

impl Parity {
    fn to_serialport(self) -> serialport::Parity {
        match self {
            Self::None => serialport::Parity::None,
            Self::Even => serialport::Parity::Even,
            Self::Odd => serialport::Parity::Odd,
        }
    }
}

/// Connection parameters for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    pub port: String,
    pub baud: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
}

impl SerialConfig {
    /// 8N1 at the given baud rate.
    pub fn new(port: impl Into<String>, baud: u32) -> Self {
        Self {
            port: port.into(),
            baud,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
        }
    }
}

/// Session lifecycle state, owned exclusively by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Opening,
    Open,
    Closing,
}

/// Events emitted by the read loop.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Bytes read from the device — whatever was available; chunking is
    /// opportunistic with no size contract.
    Data(Vec<u8>),
    /// Fatal I/O error. The session is closed and will not recover.
    Error(String),
    /// The read loop has exited and the handle is released.
    Closed,
}

struct Shared {
    /// The one OS handle. `take()`n exactly once when the loop exits.
    port: Mutex<Option<Box<dyn SerialPort>>>,
    state: Mutex<SessionState>,
    shutdown: AtomicBool,
}

/// An open serial connection with a background read loop.
pub struct SerialSession {
    events: Receiver<SessionEvent>,
    shared: Arc<Shared>,
    reader: Option<thread::JoinHandle<()>>,
}

impl SerialSession {
    /// Open `config.port` and start the read loop.
    ///
    /// Fails with [`TransportError::Open`] when the OS cannot open the
    /// device; no thread is spawned in that case.
    pub fn open(config: SerialConfig) -> Result<Self, TransportError> {
        let shared = Arc::new(Shared {
            port: Mutex::new(None),
            state: Mutex::new(SessionState::Opening),
            shutdown: AtomicBool::new(false),
        });

        let port = serialport::new(config.port.as_str(), config.baud)
            .data_bits(config.data_bits.to_serialport())
            .stop_bits(config.stop_bits.to_serialport())
            .parity(config.parity.to_serialport())
            .timeout(IO_TIMEOUT)
            .open()
            .map_err(|source| {
                *shared.state.lock() = SessionState::Closed;
                TransportError::Open {
                    port: config.port.clone(),
                    source,
                }
            })?;

        *shared.port.lock() = Some(port);
        *shared.state.lock() = SessionState::Open;

        let (tx, rx) = bounded::<SessionEvent>(SESSION_CHANNEL_CAPACITY);
        let loop_shared = shared.clone();
        let reader = thread::Builder::new()
            .name("espflasher-serial".into())
            .spawn(move || read_loop(loop_shared, tx))
            .expect("failed to spawn serial read thread");

        info!(port = %config.port, baud = config.baud, "serial session open");
        Ok(Self {
            events: rx,
            shared,
            reader: Some(reader),
        })
    }

    /// Receiver for data/error events from the read loop.
    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.events
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.lock()
    }

    /// Write `data` and flush before reporting success.
    ///
    /// Serialized against the read loop by the port mutex, so concurrent
    /// sends never interleave with reads at the byte level.
    pub fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        let mut guard = self.shared.port.lock();
        let port = guard.as_mut().ok_or(TransportError::NotOpen)?;
        port.write_all(data)?;
        port.flush()?;
        debug!("sent {} bytes", data.len());
        Ok(data.len())
    }

    /// Stop the read loop and release the port.
    ///
    /// Idempotent, and safe to call from a thread other than the read
    /// loop's. Blocks until the loop has exited and the handle is gone.
    pub fn close(&mut self) {
        {
            let mut state = self.shared.state.lock();
            if *state == SessionState::Open {
                *state = SessionState::Closing;
            }
        }
        self.shared.shutdown.store(true, Ordering::Relaxed);
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        // The loop already released the handle; this only covers the case
        // where it never ran.
        self.shared.port.lock().take();
        *self.shared.state.lock() = SessionState::Closed;
    }
}

impl Drop for SerialSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn read_loop(shared: Arc<Shared>, tx: Sender<SessionEvent>) {
    let mut buf = [0u8; 4096];
    loop {
        if shared.shutdown.load(Ordering::Relaxed) {
            break;
        }
        match next_chunk(&shared, &mut buf) {
            Ok(Some(data)) => {
                if !send_data(&shared, &tx, data) {
                    break;
                }
            }
            Ok(None) => thread::sleep(READ_POLL_INTERVAL),
            Err(message) => {
                warn!("serial read failed: {message}");
                let _ = tx.try_send(SessionEvent::Error(message));
                break;
            }
        }
    }

    // Release exactly once, then report closure. Terminal events use
    // try_send so a full channel can never hold the loop (and a joining
    // `close`) hostage.
    shared.port.lock().take();
    *shared.state.lock() = SessionState::Closed;
    let _ = tx.try_send(SessionEvent::Closed);
    debug!("serial session closed");
}

/// Deliver one data chunk with back-pressure, still honoring shutdown.
/// Returns `false` when the loop should exit.
fn send_data(shared: &Shared, tx: &Sender<SessionEvent>, data: Vec<u8>) -> bool {
    let mut event = SessionEvent::Data(data);
    loop {
        match tx.send_timeout(event, READ_POLL_INTERVAL) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(returned)) => {
                if shared.shutdown.load(Ordering::Relaxed) {
                    return false;
                }
                event = returned;
            }
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

/// One poll step: whatever bytes are available right now, `None` when idle.
fn next_chunk(shared: &Shared, buf: &mut [u8]) -> Result<Option<Vec<u8>>, String> {
    let mut guard = shared.port.lock();
    let Some(port) = guard.as_mut() else {
        return Err(String::from("port handle already released"));
    };

    let available = port.bytes_to_read().map_err(|e| e.to_string())? as usize;
    if available == 0 {
        return Ok(None);
    }

    let want = available.min(buf.len());
    match port.read(&mut buf[..want]) {
        Ok(0) => Ok(None),
        Ok(n) => Ok(Some(buf[..n].to_vec())),
        Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::Interrupted) => {
            Ok(None)
        }
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_to_8n1() {
        let config = SerialConfig::new("/dev/ttyUSB0", 115_200);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.parity, Parity::None);
    }

    #[test]
    fn test_frame_parameter_mapping() {
        assert_eq!(
            DataBits::Seven.to_serialport(),
            serialport::DataBits::Seven
        );
        assert_eq!(StopBits::Two.to_serialport(), serialport::StopBits::Two);
        assert_eq!(Parity::Even.to_serialport(), serialport::Parity::Even);
    }
}
