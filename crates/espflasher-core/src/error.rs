/// Error taxonomy for the core.
///
/// `ValidationError` is raised synchronously, before any subprocess or
/// serial handle exists. `TransportError` covers the serial session.
/// Backend process failures and probe timeouts are not Rust errors — they
/// are terminal classifications delivered through the event stream, with
/// the raw output already forwarded line-by-line.
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A malformed operation request, detected before any OS resource is
/// acquired.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("firmware file not found: {}", .0.display())]
    FirmwareNotFound(PathBuf),

    #[error("firmware file {} is not readable: {source}", .path.display())]
    FirmwareUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no serial port specified")]
    EmptyPort,

    #[error("invalid flash address {0:?}: expected a hex literal like 0x10000")]
    InvalidAddress(String),

    #[error("backup size must be greater than zero")]
    ZeroBackupSize,
}

/// A serial open/read/write failure. Always terminal for the session —
/// the core never retries transparently.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("serial I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serial port is not open")]
    NotOpen,
}
