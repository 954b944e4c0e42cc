//! Shared helpers for the integration tests.
//!
//! The flashing backend's contract is line-oriented text plus an exit
//! code, so a shell script in a tempdir is a complete stand-in for
//! esptool — the tests exercise real subprocesses, real pipes, and real
//! termination with zero mocking.
#![allow(dead_code)]

use crossbeam_channel::RecvTimeoutError;
use espflasher_core::events::{OperationEvent, OperationHandle, OperationOutcome, ProgressUpdate};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Generous bound for any fake-backend run; a genuinely stuck operation
/// fails the test instead of blocking the suite.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Install a test subscriber once so failing runs show the core's logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Write an executable shell script named `esptool` standing in for the
/// backend.
#[cfg(unix)]
pub fn write_fake_tool(dir: &Path, body: &str) -> PathBuf {
    use std::io::Write as _;
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("esptool");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "#!/bin/sh").unwrap();
    file.write_all(body.as_bytes()).unwrap();
    drop(file);

    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// A zero-filled firmware image of the given size.
pub fn write_firmware(dir: &Path, bytes: usize) -> PathBuf {
    let path = dir.join("firmware.bin");
    std::fs::write(&path, vec![0u8; bytes]).unwrap();
    path
}

/// Collect all progress events and the single terminal outcome of an
/// operation.
pub fn drain_to_outcome(
    handle: &OperationHandle<OperationEvent>,
) -> (Vec<ProgressUpdate>, OperationOutcome) {
    let deadline = Instant::now() + DRAIN_TIMEOUT;
    let mut progress = Vec::new();
    loop {
        assert!(
            Instant::now() < deadline,
            "operation did not finish within {DRAIN_TIMEOUT:?}"
        );
        match handle.events.recv_timeout(Duration::from_millis(50)) {
            Ok(OperationEvent::Progress(update)) => progress.push(update),
            Ok(OperationEvent::Finished(outcome)) => return (progress, outcome),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                panic!("event channel disconnected before a terminal event")
            }
        }
    }
}
