/// Firmware flashing — validate, optionally erase, then drive a supervised
/// `write_flash` run while extracting percentages and throughput from its
/// output.
use crossbeam_channel::{bounded, Sender};
use std::ffi::OsString;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use tracing::info;

use crate::config::EsptoolConfig;
use crate::events::{
    OperationEvent, OperationHandle, OperationOutcome, ProgressUpdate, EVENT_CHANNEL_CAPACITY,
};
use crate::model::{format_size, FlashRequest};
use crate::supervisor::stream::{pump, ProgressState, StreamEnd};
use crate::supervisor::Supervisor;

/// Start a flash run on a background thread.
///
/// The handle yields progress events and exactly one terminal `Finished`.
/// An invalid request fails before any process is spawned; cancelling an
/// in-flight run terminates the backend process and finishes with
/// [`OperationOutcome::Cancelled`].
pub fn start_flash(config: EsptoolConfig, request: FlashRequest) -> OperationHandle<OperationEvent> {
    let (tx, rx) = bounded::<OperationEvent>(EVENT_CHANNEL_CAPACITY);
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_worker = cancel.clone();

    let thread = thread::Builder::new()
        .name("espflasher-flash".into())
        .spawn(move || {
            let outcome = run_flash(&config, &request, &cancel_worker, &tx);
            let _ = tx.send(OperationEvent::Finished(outcome));
        })
        .expect("failed to spawn flash thread");

    OperationHandle::new(rx, cancel, thread)
}

fn run_flash(
    config: &EsptoolConfig,
    request: &FlashRequest,
    cancel: &AtomicBool,
    tx: &Sender<OperationEvent>,
) -> OperationOutcome {
    if let Err(e) = request.validate() {
        return OperationOutcome::Failed {
            message: format!("Error: {e}"),
        };
    }
    let file_size = match request.firmware_size() {
        Ok(size) => size,
        Err(e) => {
            return OperationOutcome::Failed {
                message: format!("cannot stat firmware file: {e}"),
            }
        }
    };

    info!(
        port = %request.port,
        chip = request.chip_arg(),
        "flashing {} ({}) at {}",
        request.firmware.display(),
        format_size(file_size),
        request.address,
    );
    note(
        tx,
        format!(
            "Preparing flash... File: {} ({})",
            file_name(&request.firmware),
            format_size(file_size),
        ),
    );
    note(tx, format!("Chip: {}", request.chip_arg()));

    if request.erase_first {
        if let Some(terminal) = run_erase(config, request, cancel, tx) {
            return terminal;
        }
    }

    // Throughput is measured from the start of the write step only.
    let mut state = ProgressState::new(Some(file_size));
    let supervisor = match Supervisor::start(&config.program, write_args(request)) {
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
            message: format!("flash supervision failed: {e}"),
        },
        StreamEnd::Exited(Ok(status)) => {
            let elapsed = state.started().elapsed();
            if status.success() {
                let _ = tx.send(OperationEvent::Progress(ProgressUpdate {
                    percent: 100,
                    message: format!(
                        "Flash completed successfully in {:.2}s!",
                        elapsed.as_secs_f64()
                    ),
                    throughput: None,
                }));
                OperationOutcome::Completed {
                    message: format!(
                        "Firmware flashed successfully in {:.2} seconds.",
                        elapsed.as_secs_f64()
                    ),
                    artifact: None,
                    elapsed,
                }
            } else {
                // The raw log was already streamed; no cause parsing here.
                OperationOutcome::Failed {
                    message: String::from("Error during flash. See logs for details."),
                }
            }
        }
    }
}

/// Run the pre-write chip erase as its own supervised process.
///
/// Returns the terminal outcome that ends the whole operation, or `None`
/// when the write step may proceed.
fn run_erase(
    config: &EsptoolConfig,
    request: &FlashRequest,
    cancel: &AtomicBool,
    tx: &Sender<OperationEvent>,
) -> Option<OperationOutcome> {
    note(tx, String::from("Erasing flash..."));
    let supervisor = match Supervisor::start(&config.program, erase_args(request)) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            return Some(OperationOutcome::Failed {
                message: format!("failed to launch {}: {e}", config.program.display()),
            })
        }
    };

    let mut state = ProgressState::new(None);
    match pump(&supervisor, cancel, &mut state, tx) {
        StreamEnd::Cancelled => Some(OperationOutcome::Cancelled),
        StreamEnd::Exited(Ok(status)) if status.success() => None,
        StreamEnd::Exited(Ok(_)) => Some(OperationOutcome::Failed {
            message: String::from("Failed to erase flash"),
        }),
        StreamEnd::Exited(Err(e)) => Some(OperationOutcome::Failed {
            message: format!("erase supervision failed: {e}"),
        }),
    }
}

fn erase_args(request: &FlashRequest) -> Vec<OsString> {
    let baud = request.baud.to_string();
    [
        "--chip",
        request.chip_arg(),
        "--port",
        request.port.as_str(),
        "--baud",
        baud.as_str(),
        "erase_flash",
    ]
    .into_iter()
    .map(OsString::from)
    .collect()
}

fn write_args(request: &FlashRequest) -> Vec<OsString> {
    let baud = request.baud.to_string();
    let mut args: Vec<OsString> = [
        "--chip",
        request.chip_arg(),
        "--port",
        request.port.as_str(),
        "--baud",
        baud.as_str(),
        "write_flash",
        "-z",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();

    if request.ota_mode {
        args.extend(["--flash_mode", "dio", "--flash_size", "detect"].map(OsString::from));
    }
    if request.verify {
        args.push(OsString::from("--verify"));
    }
    args.push(OsString::from(&request.address));
    args.push(request.firmware.as_os_str().to_os_string());
    args
}

fn note(tx: &Sender<OperationEvent>, message: String) {
    let _ = tx.send(OperationEvent::Progress(ProgressUpdate {
        percent: 0,
        message,
        throughput: None,
    }));
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
