/// Operation event stream — progress updates, terminal outcomes, and the
/// handle returned by every background operation.
///
/// The contract is uniform across probing, flashing, and backup: an
/// operation emits zero or more progress events followed by exactly one
/// terminal event, then its channel disconnects and every OS resource it
/// owned has been released. Percentages are non-decreasing within one
/// operation; consumers must tolerate duplicates.
use crossbeam_channel::Receiver;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Maximum events queued per operation before the producer blocks.
///
/// A full flash run emits a few hundred lines; 1 024 gives the consumer
/// seconds of headroom at any realistic drain rate without unbounded heap.
pub const EVENT_CHANNEL_CAPACITY: usize = 1_024;

/// One progress step of a running operation.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// 0–100, non-decreasing over the lifetime of one operation.
    pub percent: u8,
    /// Raw status line from the backend, or a synthesized stage note.
    pub message: String,
    /// Estimated bytes/second. Present only on percentage-marker lines of
    /// transfer operations, once measurable wall-clock time has elapsed.
    pub throughput: Option<f64>,
}

/// The single terminal event of an operation.
#[derive(Debug, Clone)]
pub enum OperationOutcome {
    Completed {
        message: String,
        /// Artifact produced by the run, e.g. the backup image path.
        artifact: Option<PathBuf>,
        elapsed: Duration,
    },
    Failed {
        message: String,
    },
    /// Stopped on request before completion. The underlying process was
    /// terminated; subscribers are never left without a terminal event.
    Cancelled,
}

impl OperationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn artifact(&self) -> Option<&Path> {
        match self {
            Self::Completed { artifact, .. } => artifact.as_deref(),
            _ => None,
        }
    }
}

/// Event stream element for flash and backup runs.
#[derive(Debug, Clone)]
pub enum OperationEvent {
    Progress(ProgressUpdate),
    Finished(OperationOutcome),
}

/// Handle to a running (or finished) background operation. Allows
/// cancellation and receiving events; dropping the handle detaches the
/// worker, which still releases its resources on its own.
pub struct OperationHandle<E> {
    /// Receiver for events from the worker thread.
    pub events: Receiver<E>,
    cancel: Arc<AtomicBool>,
    _thread: Option<thread::JoinHandle<()>>,
}

impl<E> OperationHandle<E> {
    pub(crate) fn new(
        events: Receiver<E>,
        cancel: Arc<AtomicBool>,
        thread: thread::JoinHandle<()>,
    ) -> Self {
        Self {
            events,
            cancel,
            _thread: Some(thread),
        }
    }

    /// Request the operation to stop as soon as possible. Non-blocking;
    /// the worker checks the flag between output lines and terminates its
    /// child within a bounded window.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}
