// src/executor/context.rs

//! Execution context shared by all executor variants.
//!
//! Holds the lifecycle state, the cached job model, the staging area and
//! the supervised process for one execution attempt. Concrete executors
//! build their phases on top of it; the parts of the contract that do not
//! depend on the language (`fetch_model`, `stop`, cleanup of a leftover
//! process) live here.
//!
//! Locking discipline:
//! - lifecycle state lives in a `watch` channel and is only changed through
//!   [`ExecutionContext::transition`], which checks and writes atomically;
//! - the process slot (supervisor handle + stop flag) is behind a std mutex
//!   that is never held across an `.await`;
//! - the job model is behind an async mutex because pushing it awaits the
//!   job store.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::errors::{ComputeError, Result};
use crate::exec::{ActiveProcess, ProcessExit, ProcessOutput};
use crate::job::{Job, JobModel};
use crate::store::JobStore;

use super::StopOutcome;
use super::lifecycle::{self, ExecutorState, Operation};
use super::staging::StagingArea;

/// Upper bound on waiting for a leftover process during cleanup.
const CLEANUP_KILL_GRACE: Duration = Duration::from_secs(5);

/// Facts about the run that end up in the final job document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRecord {
    /// When the process was about to be spawned.
    pub started_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    /// Human-readable reason the attempt failed, if it did.
    pub failure: Option<String>,
    /// Set when a requested kill could not be confirmed.
    pub termination_error: Option<String>,
    /// The process was killed on request.
    pub killed: bool,
}

impl RunRecord {
    fn record_output(&mut self, output: &ProcessOutput) {
        self.exit_code = output.exit_code;
        self.stdout = Some(output.stdout.clone());
        self.stderr = Some(output.stderr.clone());
    }
}

#[derive(Debug, Default)]
struct ProcessSlot {
    active: Option<ActiveProcess>,
    stop_requested: bool,
}

#[derive(Debug)]
struct Shared {
    job_id: String,
    state: watch::Sender<ExecutorState>,
    process: Mutex<ProcessSlot>,
    record: Mutex<RunRecord>,
    staging: Mutex<Option<StagingArea>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Shared {
    fn transition(&self, to: ExecutorState) -> Result<ExecutorState> {
        let mut result = Ok(to);
        let mut from = to;
        self.state.send_if_modified(|current| {
            from = *current;
            match lifecycle::transition(*current, to) {
                Ok(next) => {
                    let changed = *current != next;
                    *current = next;
                    changed
                }
                Err(e) => {
                    result = Err(e);
                    false
                }
            }
        });
        if result.is_ok() {
            debug!(job_id = %self.job_id, %from, %to, "executor state changed");
        }
        result
    }

    /// Record how the process ended and move to the matching state.
    fn finish_run(&self, exit: &ProcessExit) {
        let next = {
            let mut record = lock(&self.record);
            match exit {
                ProcessExit::Exited(output) => {
                    record.record_output(output);
                    if output.success {
                        ExecutorState::Completed
                    } else {
                        record.failure = Some(match output.exit_code {
                            Some(code) => format!("process exited with code {code}"),
                            None => "process terminated by signal".to_string(),
                        });
                        ExecutorState::Failed
                    }
                }
                ProcessExit::Killed(output) => {
                    if let Some(output) = output {
                        record.record_output(output);
                    }
                    record.killed = true;
                    ExecutorState::Aborted
                }
                ProcessExit::KillFailed(e) => {
                    record.termination_error = Some(e.clone());
                    record.failure = Some(format!("termination not confirmed: {e}"));
                    ExecutorState::Failed
                }
                ProcessExit::WaitFailed(e) => {
                    record.failure = Some(e.clone());
                    ExecutorState::Failed
                }
            }
        };

        if let Err(e) = self.transition(next) {
            warn!(job_id = %self.job_id, error = %e, "could not record process exit");
        }
    }
}

/// Lifecycle state, job model and resources of one execution attempt.
pub struct ExecutionContext {
    shared: Arc<Shared>,
    model: tokio::sync::Mutex<JobModel>,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("job_id", &self.shared.job_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ExecutionContext {
    pub fn new(job_id: impl Into<String>, store: Arc<dyn JobStore>) -> Self {
        let job_id = job_id.into();
        let model = JobModel::new(job_id.clone(), store);
        Self::build(job_id, model, ExecutorState::Created)
    }

    /// Start in `ModelLoaded` from a document the caller already fetched.
    pub fn with_job(job: Job, store: Arc<dyn JobStore>) -> Self {
        let job_id = job.id.clone();
        let model = JobModel::with_job(job, store);
        Self::build(job_id, model, ExecutorState::ModelLoaded)
    }

    fn build(job_id: String, model: JobModel, initial: ExecutorState) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            shared: Arc::new(Shared {
                job_id,
                state,
                process: Mutex::new(ProcessSlot::default()),
                record: Mutex::new(RunRecord::default()),
                staging: Mutex::new(None),
            }),
            model: tokio::sync::Mutex::new(model),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.shared.job_id
    }

    pub fn state(&self) -> ExecutorState {
        *self.shared.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ExecutorState> {
        self.shared.state.subscribe()
    }

    pub fn check(&self, op: Operation) -> Result<()> {
        lifecycle::check(op, self.state())
    }

    pub fn transition(&self, to: ExecutorState) -> Result<ExecutorState> {
        self.shared.transition(to)
    }

    pub fn model(&self) -> &tokio::sync::Mutex<JobModel> {
        &self.model
    }

    /// Snapshot of the cached job document.
    pub async fn job(&self) -> Option<Job> {
        self.model.lock().await.job().cloned()
    }

    /// Load the job document; a no-op once the model is loaded.
    pub async fn fetch_model(&self) -> Result<()> {
        self.check(Operation::FetchModel)?;

        let mut model = self.model.lock().await;
        if self.state() == ExecutorState::ModelLoaded && model.is_loaded() {
            return Ok(());
        }
        model.fetch().await?;
        drop(model);

        self.transition(ExecutorState::ModelLoaded)?;
        Ok(())
    }

    pub fn set_staging(&self, staging: StagingArea) {
        *lock(&self.shared.staging) = Some(staging);
    }

    pub fn staging(&self) -> Option<StagingArea> {
        lock(&self.shared.staging).clone()
    }

    pub fn take_staging(&self) -> Option<StagingArea> {
        lock(&self.shared.staging).take()
    }

    pub fn record_failure(&self, message: impl Into<String>) {
        lock(&self.shared.record).failure = Some(message.into());
    }

    pub fn run_record(&self) -> RunRecord {
        lock(&self.shared.record).clone()
    }

    /// Move to `Running` unless a stop was already requested.
    ///
    /// The check and the transition happen under the process slot lock, so a
    /// concurrent [`ExecutionContext::stop`] either sees `Running` and waits
    /// for the process, or leaves a request that makes this return `false`.
    pub fn begin_run(&self) -> Result<bool> {
        let slot = lock(&self.shared.process);
        if slot.stop_requested {
            return Ok(false);
        }
        self.transition(ExecutorState::Running)?;
        drop(slot);
        lock(&self.shared.record).started_at = Some(Utc::now());
        Ok(true)
    }

    /// Callback for [`crate::exec::supervise`] that records the exit.
    pub fn exit_recorder(&self) -> impl FnOnce(&ProcessExit) + Send + 'static {
        let shared = Arc::clone(&self.shared);
        move |exit| shared.finish_run(exit)
    }

    /// Keep the supervisor of the running process.
    ///
    /// If a stop was requested before the process was registered, the
    /// cancellation is sent right away.
    pub fn register_process(&self, mut active: ActiveProcess) {
        let mut slot = lock(&self.shared.process);
        if slot.stop_requested {
            info!(job_id = %self.job_id(), "stop requested during spawn; cancelling");
            active.request_cancel();
        }
        slot.active = Some(active);
    }

    /// Request termination of the running process and wait until it is
    /// confirmed.
    ///
    /// Outside `Running` this returns immediately without terminating
    /// anything; before the process exists it leaves a stop request behind
    /// so that a later start does not spawn.
    pub async fn stop(&self) -> Result<StopOutcome> {
        let mut rx = self.subscribe();
        {
            let mut slot = lock(&self.shared.process);
            let state = self.state();
            match state {
                ExecutorState::Running => {
                    slot.stop_requested = true;
                    if let Some(active) = slot.active.as_mut() {
                        if active.request_cancel() {
                            info!(job_id = %self.job_id(), "termination requested");
                        }
                    }
                }
                ExecutorState::Created | ExecutorState::ModelLoaded | ExecutorState::Prepared => {
                    slot.stop_requested = true;
                    info!(job_id = %self.job_id(), %state, "stop requested before process start");
                    return Ok(StopOutcome::noop(state));
                }
                _ => {
                    debug!(job_id = %self.job_id(), %state, "stop requested after run finished");
                    return Ok(StopOutcome::noop(state));
                }
            }
        }

        let final_state = {
            let seen = rx
                .wait_for(|s| *s != ExecutorState::Running)
                .await
                .map_err(|_| ComputeError::Termination("executor dropped".to_string()))?;
            *seen
        };

        let record = self.run_record();
        if let Some(err) = record.termination_error {
            return Err(ComputeError::Termination(err));
        }

        // Cleanup may already have moved past the run state.
        let state = if record.killed {
            ExecutorState::Aborted
        } else {
            final_state
        };
        info!(job_id = %self.job_id(), %state, "stop confirmed");
        Ok(StopOutcome {
            state,
            terminated: record.killed,
        })
    }

    /// Make sure no process outlives the execution attempt.
    ///
    /// Normally the process is long gone when cleanup runs. If it is not
    /// (e.g. the start future was dropped), it is killed here and the run is
    /// marked `Aborted`.
    pub async fn terminate_leftover(&self) {
        let active = lock(&self.shared.process).active.take();
        let Some(mut active) = active else {
            return;
        };
        if active.is_finished() {
            return;
        }

        warn!(job_id = %self.job_id(), "process still running during cleanup; terminating");
        active.request_cancel();

        let mut rx = self.subscribe();
        let confirmed = matches!(
            tokio::time::timeout(
                CLEANUP_KILL_GRACE,
                rx.wait_for(|s| *s != ExecutorState::Running),
            )
            .await,
            Ok(Ok(_))
        );
        if !confirmed {
            // Dropping the process kills it.
            active.abort();
            if let Err(e) = self.transition(ExecutorState::Aborted) {
                debug!(job_id = %self.job_id(), error = %e, "state already final");
            }
        }
    }
}
