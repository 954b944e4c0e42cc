/// Operation sequencing — run dependent device operations ("backup, then
/// flash") as one plan behind a single stage-tagged event stream.
///
/// Stages run strictly in order on one coordinator thread; a stage that
/// fails (or is cancelled) ends the plan and later stages never start.
/// The two operations never hold the port at the same time — each stage's
/// process has fully terminated before the next begins.
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

use crate::backup::start_backup;
use crate::config::EsptoolConfig;
use crate::events::{OperationEvent, OperationHandle, OperationOutcome, ProgressUpdate};
use crate::flash::start_flash;
use crate::model::{BackupRequest, FlashRequest};

/// How often the coordinator re-checks its own cancellation flag while a
/// stage is silent.
const STAGE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Events queued per plan; stages forward at most one event per backend
/// output line, so this mirrors the per-operation capacity.
pub const PLAN_CHANNEL_CAPACITY: usize = 1_024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Backup,
    Flash,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backup => f.write_str("backup"),
            Self::Flash => f.write_str("flash"),
        }
    }
}

/// A flash run, optionally preceded by a safety backup of the current
/// flash contents (the original GUI's "backup before flash" option).
#[derive(Debug, Clone)]
pub struct FlashPlan {
    pub backup: Option<BackupRequest>,
    pub flash: FlashRequest,
}

/// Terminal result of a plan.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    /// Outcome of the stage that ended the plan.
    pub outcome: OperationOutcome,
    /// The stage it came from.
    pub stage: Stage,
    /// Artifacts produced by stages that completed (e.g. the backup image),
    /// kept even when a later stage fails.
    pub artifacts: Vec<PathBuf>,
}

/// Uniform event stream for a running plan.
#[derive(Debug, Clone)]
pub enum PlanEvent {
    StageStarted(Stage),
    Progress { stage: Stage, update: ProgressUpdate },
    Finished(PlanOutcome),
}

/// Run `plan` on a background coordinator thread.
///
/// Cancellation propagates to the in-flight stage: its process is
/// terminated and the plan finishes with a `Cancelled` outcome.
pub fn start_plan(config: EsptoolConfig, plan: FlashPlan) -> OperationHandle<PlanEvent> {
    let (tx, rx) = bounded::<PlanEvent>(PLAN_CHANNEL_CAPACITY);
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_worker = cancel.clone();

    let thread = thread::Builder::new()
        .name("espflasher-plan".into())
        .spawn(move || run_plan(config, plan, &cancel_worker, &tx))
        .expect("failed to spawn plan thread");

    OperationHandle::new(rx, cancel, thread)
}

fn run_plan(
    config: EsptoolConfig,
    plan: FlashPlan,
    cancel: &AtomicBool,
    tx: &Sender<PlanEvent>,
) {
    let mut artifacts: Vec<PathBuf> = Vec::new();

    if let Some(backup_request) = plan.backup {
        info!(port = %backup_request.port, "plan: backup stage starting");
        let _ = tx.send(PlanEvent::StageStarted(Stage::Backup));
        let handle = start_backup(config.clone(), backup_request);
        let outcome = drain_stage(&handle, Stage::Backup, cancel, tx);
        match outcome {
            OperationOutcome::Completed { artifact, .. } => {
                artifacts.extend(artifact);
            }
            other => {
                // Backup did not complete — the flash stage never starts.
                let _ = tx.send(PlanEvent::Finished(PlanOutcome {
                    outcome: other,
                    stage: Stage::Backup,
                    artifacts,
                }));
                return;
            }
        }
    }

    info!(port = %plan.flash.port, "plan: flash stage starting");
    let _ = tx.send(PlanEvent::StageStarted(Stage::Flash));
    let handle = start_flash(config, plan.flash);
    let outcome = drain_stage(&handle, Stage::Flash, cancel, tx);
    let _ = tx.send(PlanEvent::Finished(PlanOutcome {
        outcome,
        stage: Stage::Flash,
        artifacts,
    }));
}

/// Forward one stage's events re-tagged with its stage, propagating
/// cancellation, until its terminal outcome arrives.
fn drain_stage(
    handle: &OperationHandle<OperationEvent>,
    stage: Stage,
    cancel: &AtomicBool,
    tx: &Sender<PlanEvent>,
) -> OperationOutcome {
    loop {
        if cancel.load(Ordering::Relaxed) {
            handle.cancel();
        }
        match handle.events.recv_timeout(STAGE_POLL_INTERVAL) {
            Ok(OperationEvent::Progress(update)) => {
                let _ = tx.send(PlanEvent::Progress { stage, update });
            }
            Ok(OperationEvent::Finished(outcome)) => return outcome,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                return OperationOutcome::Failed {
                    message: format!("{stage} worker ended without a terminal event"),
                }
            }
        }
    }
}
