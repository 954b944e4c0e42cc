/// Bridges a supervised child's output onto an operation event channel,
/// maintaining the monotone percentage and the throughput estimate.
use crossbeam_channel::{RecvTimeoutError, Sender};
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::events::{OperationEvent, ProgressUpdate};
use crate::parse;
use crate::supervisor::Supervisor;

/// How often the pump re-checks the cancellation flag while the child is
/// silent.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Why the line stream stopped.
pub(crate) enum StreamEnd {
    /// The child closed its output; carries the result of reaping it.
    Exited(std::io::Result<ExitStatus>),
    /// Cancellation was requested between lines; the child was terminated.
    Cancelled,
}

/// Progress bookkeeping for one transfer step.
///
/// Percentages only ever move forward; a marker below the running maximum
/// re-emits the maximum, which keeps the published sequence non-decreasing
/// regardless of output jitter.
pub(crate) struct ProgressState {
    percent: u8,
    total_bytes: Option<u64>,
    started: Instant,
}

impl ProgressState {
    pub fn new(total_bytes: Option<u64>) -> Self {
        Self {
            percent: 0,
            total_bytes,
            started: Instant::now(),
        }
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// Fold one output line into the state, producing the update to emit.
    pub fn absorb(&mut self, line: &str) -> ProgressUpdate {
        match parse::percent_marker(line) {
            Some(marker) => {
                self.percent = self.percent.max(marker);
                ProgressUpdate {
                    percent: self.percent,
                    message: line.to_string(),
                    throughput: self.throughput(),
                }
            }
            None => ProgressUpdate {
                percent: self.percent,
                message: line.to_string(),
                throughput: None,
            },
        }
    }

    /// `total * percent / elapsed`, undefined until time has passed.
    fn throughput(&self) -> Option<f64> {
        let total = self.total_bytes?;
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }
        Some(total as f64 * f64::from(self.percent) / 100.0 / elapsed)
    }
}

/// Forward every output line as a progress event until the child exits or
/// cancellation is requested.
pub(crate) fn pump(
    supervisor: &Supervisor,
    cancel: &AtomicBool,
    state: &mut ProgressState,
    tx: &Sender<OperationEvent>,
) -> StreamEnd {
    loop {
        if cancel.load(Ordering::Relaxed) {
            supervisor.terminate();
            return StreamEnd::Cancelled;
        }
        match supervisor.lines().recv_timeout(CANCEL_POLL_INTERVAL) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let update = state.absorb(&line);
                let _ = tx.send(OperationEvent::Progress(update));
            }
            Err(RecvTimeoutError::Timeout) => continue, // silent child; re-check cancel
            Err(RecvTimeoutError::Disconnected) => return StreamEnd::Exited(supervisor.wait()),
        }
    }
}
