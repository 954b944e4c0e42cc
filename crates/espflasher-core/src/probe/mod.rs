/// Board detection — probe serial ports with the backend's `flash_id`
/// command and classify what is attached.
///
/// Each probe is bounded by a hard timeout and runs against exactly one
/// port. A port whose probe blows up unexpectedly (launch failure, broken
/// pipe) is dropped from the report while the remaining ports continue —
/// one misbehaving driver must never abort a whole scan. That isolation
/// policy is specific to probing; flash and backup always surface failures.
pub(crate) mod classify;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::EsptoolConfig;
use crate::events::{OperationHandle, EVENT_CHANNEL_CAPACITY};
use crate::model::{BoardDetection, ChipReading};
use crate::ports::{list_ports, PortDescriptor};
use crate::supervisor::Supervisor;

/// Events from a background detection scan.
#[derive(Debug, Clone)]
pub enum DetectionEvent {
    /// One port finished probing.
    Detected(BoardDetection),
    /// Terminal: every port has been probed (or the scan was cancelled
    /// early); carries the full report.
    Complete(Vec<BoardDetection>),
}

/// Probe a single port, bounded by `config.probe_timeout`.
///
/// Returns `None` when the probe could not run at all (the port-skip
/// policy); timeouts and non-zero exits are real results, classified as
/// [`ChipReading::TimedOut`] and [`ChipReading::Failed`].
pub fn probe_port(config: &EsptoolConfig, port: &PortDescriptor) -> Option<BoardDetection> {
    let supervisor = match Supervisor::start(
        &config.program,
        ["--port", port.device.as_str(), "flash_id"],
    ) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            warn!(port = %port.device, "skipping port, probe failed to launch: {e}");
            return None;
        }
    };

    let deadline = Instant::now() + config.probe_timeout;
    let mut output: Vec<String> = Vec::new();
    loop {
        match supervisor.lines().recv_deadline(deadline) {
            Ok(line) => output.push(line),
            Err(RecvTimeoutError::Timeout) => {
                debug!(port = %port.device, "probe timed out, terminating");
                supervisor.terminate();
                return Some(BoardDetection::without_details(port, ChipReading::TimedOut));
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let status = match supervisor.wait_deadline(deadline) {
        Ok(Some(status)) => status,
        Ok(None) => {
            debug!(port = %port.device, "probe closed output but did not exit in time");
            supervisor.terminate();
            return Some(BoardDetection::without_details(port, ChipReading::TimedOut));
        }
        Err(e) => {
            warn!(port = %port.device, "skipping port, probe wait failed: {e}");
            return None;
        }
    };

    if !status.success() {
        return Some(BoardDetection::without_details(port, ChipReading::Failed));
    }

    let scan = classify::scan_output(output.iter().map(String::as_str));
    Some(BoardDetection {
        port: port.device.clone(),
        description: port.description.clone(),
        chip: scan.chip.map(ChipReading::Identified).unwrap_or(ChipReading::Unknown),
        mac: scan.mac,
        flash_size: scan.flash_size,
    })
}

/// Probe every enumerated port on a background thread.
///
/// Ports are probed in parallel on a pool bounded by the smaller of the
/// port count and the CPU count; the pool bound is what limits concurrent
/// backend invocations. Completion order is unspecified — consumers index
/// the report by port id, not position.
pub fn start_detection(config: EsptoolConfig) -> OperationHandle<DetectionEvent> {
    let (tx, rx) = bounded::<DetectionEvent>(EVENT_CHANNEL_CAPACITY);
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_worker = cancel.clone();

    let thread = thread::Builder::new()
        .name("espflasher-detect".into())
        .spawn(move || {
            let ports = list_ports();
            info!("probing {} serial port(s)", ports.len());
            let boards = scan_ports(&config, &ports, &cancel_worker, &tx);
            let _ = tx.send(DetectionEvent::Complete(boards));
        })
        .expect("failed to spawn detection thread");

    OperationHandle::new(rx, cancel, thread)
}

fn scan_ports(
    config: &EsptoolConfig,
    ports: &[PortDescriptor],
    cancel: &AtomicBool,
    tx: &Sender<DetectionEvent>,
) -> Vec<BoardDetection> {
    if ports.is_empty() {
        return Vec::new();
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(ports.len().min(num_cpus::get()))
        .thread_name(|i| format!("espflasher-probe-{i}"))
        .build()
        .expect("failed to build probe thread pool");

    pool.install(|| {
        ports
            .par_iter()
            .filter_map(|port| {
                if cancel.load(Ordering::Relaxed) {
                    return None;
                }
                let detection = probe_port(config, port)?;
                let _ = tx.send(DetectionEvent::Detected(detection.clone()));
                Some(detection)
            })
            .collect()
    })
}
