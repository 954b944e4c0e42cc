/// Flash backups — read the device's flash into a timestamped file, and
/// inventory previously-created backup images.
use chrono::{DateTime, Local};
use crossbeam_channel::{bounded, Sender};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use tracing::info;

use crate::config::EsptoolConfig;
use crate::events::{
    OperationEvent, OperationHandle, OperationOutcome, ProgressUpdate, EVENT_CHANNEL_CAPACITY,
};
use crate::model::{format_size, BackupRequest};
use crate::supervisor::stream::{pump, ProgressState, StreamEnd};
use crate::supervisor::Supervisor;

/// Start a backup run on a background thread.
///
/// On success the terminal outcome carries the created file's path. On
/// failure a partially-written file is left in place — callers wanting
/// atomicity should back up into a scratch directory and rename afterwards.
pub fn start_backup(
    config: EsptoolConfig,
    request: BackupRequest,
) -> OperationHandle<OperationEvent> {
    let (tx, rx) = bounded::<OperationEvent>(EVENT_CHANNEL_CAPACITY);
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_worker = cancel.clone();

    let thread = thread::Builder::new()
        .name("espflasher-backup".into())
        .spawn(move || {
            let outcome = run_backup(&config, &request, &cancel_worker, &tx);
            let _ = tx.send(OperationEvent::Finished(outcome));
        })
        .expect("failed to spawn backup thread");

    OperationHandle::new(rx, cancel, thread)
}

fn run_backup(
    config: &EsptoolConfig,
    request: &BackupRequest,
    cancel: &AtomicBool,
    tx: &Sender<OperationEvent>,
) -> OperationOutcome {
    if let Err(e) = request.validate() {
        return OperationOutcome::Failed {
            message: format!("Error: {e}"),
        };
    }
    if let Err(e) = fs::create_dir_all(&request.output_dir) {
        return OperationOutcome::Failed {
            message: format!(
                "cannot create backup directory {}: {e}",
                request.output_dir.display()
            ),
        };
    }

    let file_name = backup_file_name(request.chip_arg(), &request.port, Local::now());
    let backup_path = request.output_dir.join(&file_name);
    info!(port = %request.port, "backing up {} to {}", format_size(request.size_bytes), backup_path.display());

    let mut state = ProgressState::new(Some(request.size_bytes));
    let _ = tx.send(OperationEvent::Progress(ProgressUpdate {
        percent: 0,
        message: format!("Starting backup of {}...", format_size(request.size_bytes)),
        throughput: None,
    }));

    let supervisor = match Supervisor::start(&config.program, read_args(request, &backup_path)) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            return OperationOutcome::Failed {
                message: format!("failed to launch {}: {e}", config.program.display()),
            }
        }
    };

    match pump(&supervisor, cancel, &mut state, tx) {
        StreamEnd::Cancelled => OperationOutcome::Cancelled,
        StreamEnd::Exited(Err(e)) => OperationOutcome::Failed {
            message: format!("backup supervision failed: {e}"),
        },
        StreamEnd::Exited(Ok(status)) => {
            let elapsed = state.started().elapsed();
            if status.success() {
                let _ = tx.send(OperationEvent::Progress(ProgressUpdate {
                    percent: 100,
                    message: String::from("Backup completed!"),
                    throughput: None,
                }));
                OperationOutcome::Completed {
                    message: format!("Backup saved to {file_name}"),
                    artifact: Some(backup_path),
                    elapsed,
                }
            } else {
                OperationOutcome::Failed {
                    message: String::from("Error during backup. See logs for details."),
                }
            }
        }
    }
}

fn read_args(request: &BackupRequest, backup_path: &Path) -> Vec<OsString> {
    let baud = request.baud.to_string();
    let size = request.size_bytes.to_string();
    let mut args: Vec<OsString> = [
        "--chip",
        request.chip_arg(),
        "--port",
        request.port.as_str(),
        "--baud",
        baud.as_str(),
        "read_flash",
        "0x0",
        size.as_str(),
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    args.push(backup_path.as_os_str().to_os_string());
    args
}

/// `backup_<chip>_<port>_<YYYYMMDD_HHMMSS>.bin`, with the port's path
/// separators flattened so it is filesystem-safe. Embedding the port id
/// keeps two same-second backups on different ports from colliding.
fn backup_file_name(chip: &str, port: &str, at: DateTime<Local>) -> String {
    format!(
        "backup_{}_{}_{}.bin",
        chip,
        sanitize_port(port),
        at.format("%Y%m%d_%H%M%S")
    )
}

fn sanitize_port(port: &str) -> String {
    let flattened: String = port
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    flattened.trim_matches('_').to_string()
}

/// One previously-created backup image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: DateTime<Local>,
}

/// List the `.bin` files in `dir`, newest first.
///
/// A missing or unreadable directory is an empty inventory, not an error.
pub fn list_backups(dir: &Path) -> Vec<BackupFile> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut backups: Vec<BackupFile> = entries
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("bin") {
                return None;
            }
            let meta = entry.metadata().ok()?;
            let modified = meta.modified().ok()?;
            Some(BackupFile {
                path,
                size_bytes: meta.len(),
                modified: DateTime::<Local>::from(modified),
            })
        })
        .collect();
    backups.sort_by(|a, b| b.modified.cmp(&a.modified));
    backups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sanitize_port() {
        assert_eq!(sanitize_port("/dev/ttyUSB0"), "dev_ttyUSB0");
        assert_eq!(sanitize_port("COM3"), "COM3");
        assert_eq!(sanitize_port("/dev/cu.usbserial-0001"), "dev_cu_usbserial_0001");
    }

    #[test]
    fn test_same_second_different_ports_do_not_collide() {
        let at = Local.with_ymd_and_hms(2026, 8, 6, 12, 30, 45).unwrap();
        let a = backup_file_name("esp32", "/dev/ttyUSB0", at);
        let b = backup_file_name("esp32", "/dev/ttyUSB1", at);
        assert_ne!(a, b);
        assert_eq!(a, "backup_esp32_dev_ttyUSB0_20260806_123045.bin");
    }

    #[test]
    fn test_list_backups_missing_dir() {
        assert!(list_backups(Path::new("/nonexistent/backups")).is_empty());
    }

    #[test]
    fn test_list_backups_filters_and_sorts() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("old.bin"), b"aa").unwrap();
        fs::write(tmp.path().join("notes.txt"), b"bb").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(tmp.path().join("new.bin"), b"cccc").unwrap();

        let backups = list_backups(tmp.path());
        assert_eq!(backups.len(), 2);
        assert_eq!(backups[0].path.file_name().unwrap(), "new.bin");
        assert_eq!(backups[0].size_bytes, 4);
    }
}
