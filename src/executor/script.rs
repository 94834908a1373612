// src/executor/script.rs

//! Executor for interpreted-script jobs.
//!
//! Staging layout for one attempt:
//!
//! ```text
//! <work_dir>/<job_id>-<unique>/
//!   input/
//!     algo.<ext>      algorithm source, written verbatim
//!     ...             materialised input data
//!   output/           created right before the process starts
//! ```
//!
//! The interpreter is invoked with a discrete argument vector:
//!
//! ```text
//! <interpreter> <runner_script> <input>/algo.<ext> <entry_class> <input> <threads> <output> [params...]
//! ```

use std::path::PathBuf;

use chrono::Utc;
use futures::future::{BoxFuture, join_all};
use tracing::{debug, error, info, warn};

use crate::config::ConfigFile;
use crate::errors::{ComputeError, Result, UploadFailure};
use crate::exec::{Invocation, ProcessExit, supervise};
use crate::job::{Job, JobPatch, JobStatus};
use crate::store::output_container_name;

use super::context::ExecutionContext;
use super::lifecycle::{ExecutorState, Operation};
use super::staging::StagingArea;
use super::{Collaborators, JobExecutor, StopOutcome};

/// Everything the script executor needs from the node configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSettings {
    /// Parent directory of the per-attempt staging directories.
    pub work_dir: PathBuf,
    pub interpreter: String,
    pub runner_script: PathBuf,
    /// Entry class / function the runner looks up in the algorithm module.
    pub entry_class: String,
    /// Extension of the algorithm source file, without the dot.
    pub extension: String,
    /// Parallelism hint handed to the runner.
    pub threads: usize,
}

impl ScriptSettings {
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self {
            work_dir: cfg.compute.work_dir.clone(),
            interpreter: cfg.python.interpreter.clone(),
            runner_script: cfg.python.runner_script.clone(),
            entry_class: cfg.python.entry_class.clone(),
            extension: cfg.python.extension.clone(),
            threads: cfg.compute.threads,
        }
    }

    pub fn algorithm_file_name(&self) -> String {
        format!("algo.{}", self.extension)
    }

    /// Build the interpreter invocation for a prepared staging area.
    pub fn invocation(&self, staging: &StagingArea, params: &[String]) -> Invocation {
        let input = staging.input_dir();
        let output = staging.output_dir();
        Invocation::new(&self.interpreter)
            .arg(&self.runner_script)
            .arg(input.join(self.algorithm_file_name()))
            .arg(&self.entry_class)
            .arg(&input)
            .arg(self.threads.to_string())
            .arg(&output)
            .args(params)
            .current_dir(&input)
    }
}

pub struct ScriptJobExecutor {
    ctx: ExecutionContext,
    settings: ScriptSettings,
    collab: Collaborators,
}

impl std::fmt::Debug for ScriptJobExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptJobExecutor")
            .field("ctx", &self.ctx)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ScriptJobExecutor {
    pub fn new(job_id: impl Into<String>, settings: ScriptSettings, collab: Collaborators) -> Self {
        let ctx = ExecutionContext::new(job_id, collab.jobs.clone());
        Self {
            ctx,
            settings,
            collab,
        }
    }

    /// Build an executor around an already-fetched job document.
    pub fn with_job(job: Job, settings: ScriptSettings, collab: Collaborators) -> Self {
        let ctx = ExecutionContext::with_job(job, collab.jobs.clone());
        Self {
            ctx,
            settings,
            collab,
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub fn settings(&self) -> &ScriptSettings {
        &self.settings
    }

    /// Record a phase failure and move to `Failed`.
    fn fail(&self, err: &ComputeError) {
        warn!(job_id = %self.ctx.job_id(), error = %err, "execution attempt failed");
        self.ctx.record_failure(err.to_string());
        if let Err(e) = self.ctx.transition(ExecutorState::Failed) {
            debug!(job_id = %self.ctx.job_id(), error = %e, "state already final");
        }
    }

    async fn prepare(&self) -> Result<()> {
        self.ctx.check(Operation::PreExecution)?;
        let job_id = self.ctx.job_id();

        let staging = match StagingArea::allocate(&self.settings.work_dir, job_id).await {
            Ok(staging) => staging,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };
        self.ctx.set_staging(staging.clone());

        if let Err(e) = self.stage(&staging).await {
            let e = match e {
                ComputeError::Staging(_) => e,
                other => ComputeError::Staging(other.to_string()),
            };
            self.fail(&e);
            return Err(e);
        }

        self.ctx.transition(ExecutorState::Prepared)?;
        info!(job_id, staging = ?staging.path(), "job prepared");
        Ok(())
    }

    async fn stage(&self, staging: &StagingArea) -> Result<()> {
        let job_id = self.ctx.job_id();
        let input = staging.create_input_dir().await?;

        self.collab
            .jobs
            .materialize_data(job_id, &input)
            .await
            .map_err(|e| ComputeError::Staging(format!("materialising input data: {e}")))?;
        debug!(job_id, "input data materialised");

        let source = self
            .collab
            .algorithms
            .source_code(job_id)
            .await
            .map_err(|e| ComputeError::Staging(format!("fetching algorithm source: {e}")))?;

        let path = staging
            .write_input_file(&self.settings.algorithm_file_name(), &source)
            .await?;
        debug!(job_id, bytes = source.len(), ?path, "algorithm source written");
        Ok(())
    }

    /// Run the interpreter until it exits or is stopped.
    async fn run(&self) -> Result<()> {
        self.ctx.check(Operation::StartExecution)?;
        let job_id = self.ctx.job_id();

        let Some(staging) = self.ctx.staging() else {
            return Err(ComputeError::InvalidState {
                operation: Operation::StartExecution.as_str(),
                state: "no staging area".to_string(),
            });
        };

        if !self.ctx.begin_run()? {
            info!(job_id, "stop requested before start; not spawning");
            self.ctx.transition(ExecutorState::Aborted)?;
            return Ok(());
        }
        self.push_running().await;

        if let Err(e) = staging.create_output_dir().await {
            self.fail(&e);
            return Err(e);
        }

        let params = self.ctx.job().await.map(|j| j.params).unwrap_or_default();
        let invocation = self.settings.invocation(&staging, &params);

        let process = match self.collab.runner.spawn(job_id, &invocation) {
            Ok(process) => process,
            Err(e) => {
                let e = match e {
                    ComputeError::Process { .. } => e,
                    other => ComputeError::Process {
                        exit_code: None,
                        cause: other.to_string(),
                    },
                };
                self.fail(&e);
                return Err(e);
            }
        };

        let (active, handle) = supervise(job_id.to_string(), process, self.ctx.exit_recorder());
        self.ctx.register_process(active);

        match handle.await {
            Ok(ProcessExit::Exited(output)) if output.success => Ok(()),
            Ok(ProcessExit::Exited(output)) => Err(ComputeError::Process {
                exit_code: output.exit_code,
                cause: "algorithm process exited unsuccessfully".to_string(),
            }),
            Ok(ProcessExit::Killed(_)) => Ok(()),
            Ok(ProcessExit::KillFailed(e)) => Err(ComputeError::Termination(e)),
            Ok(ProcessExit::WaitFailed(e)) => Err(ComputeError::Process {
                exit_code: None,
                cause: e,
            }),
            Err(join) => {
                let e = ComputeError::Process {
                    exit_code: None,
                    cause: format!("process supervisor failed: {join}"),
                };
                self.fail(&e);
                Err(e)
            }
        }
    }

    async fn push_running(&self) {
        let patch = JobPatch {
            new_attempt: true,
            status: Some(JobStatus::Running),
            start_date: self.ctx.run_record().started_at,
            ..JobPatch::default()
        };
        if let Err(e) = self.ctx.model().lock().await.push(patch).await {
            warn!(job_id = %self.ctx.job_id(), error = %e, "could not persist running status");
        }
    }

    /// Upload outputs, persist the final document, remove the staging area.
    async fn finalize(&self) -> Result<JobStatus> {
        self.ctx.check(Operation::PostExecution)?;
        let job_id = self.ctx.job_id();

        self.ctx.terminate_leftover().await;
        if matches!(
            self.ctx.state(),
            ExecutorState::Prepared | ExecutorState::Running
        ) {
            self.ctx.transition(ExecutorState::Aborted)?;
        }

        // Output is rebuilt from scratch on every attempt.
        self.ctx.model().lock().await.apply(&JobPatch {
            output: Some(Vec::new()),
            ..JobPatch::default()
        });

        let container = output_container_name(job_id);
        let staging = self.ctx.staging();
        let (names, uploaded) = self.upload_outputs(staging.as_ref(), &container).await;

        if let Some(staging) = self.ctx.take_staging() {
            if let Err(e) = staging.remove().await {
                warn!(job_id, error = %e, "could not remove staging directory");
            }
        }

        let record = self.ctx.run_record();
        let run_status = self
            .ctx
            .state()
            .outcome_status()
            .unwrap_or(JobStatus::Failed);
        let status = if uploaded.is_ok() {
            run_status
        } else {
            JobStatus::Failed
        };
        let message = match uploaded {
            Err(ref e) => Some(e.to_string()),
            Ok(()) => record.failure.clone(),
        };

        let patch = JobPatch {
            new_attempt: true,
            status: Some(status),
            output: Some(names),
            start_date: record.started_at,
            exit_code: record.exit_code,
            stdout: record.stdout,
            stderr: record.stderr,
            end_date: Some(Utc::now()),
            message,
            ..JobPatch::default()
        };
        let pushed = self.ctx.model().lock().await.push(patch).await;

        self.ctx.transition(ExecutorState::CleanedUp)?;
        info!(job_id, %status, "execution attempt finished");

        uploaded?;
        pushed?;
        Ok(status)
    }

    /// Create the output container and upload every file in `output/`.
    ///
    /// Returns the listed file names together with the aggregate outcome.
    async fn upload_outputs(
        &self,
        staging: Option<&StagingArea>,
        container: &str,
    ) -> (Vec<String>, Result<()>) {
        let job_id = self.ctx.job_id();

        if let Err(e) = self.collab.storage.create_container(container).await {
            let failure = UploadFailure {
                file: container.to_string(),
                cause: format!("creating container: {e}"),
            };
            return (
                Vec::new(),
                Err(ComputeError::Upload {
                    failures: vec![failure],
                }),
            );
        }

        let Some(staging) = staging else {
            return (Vec::new(), Ok(()));
        };
        let names = match staging.list_output_files().await {
            Ok(Some(names)) => names,
            Ok(None) => {
                debug!(job_id, "no output directory; nothing to upload");
                return (Vec::new(), Ok(()));
            }
            Err(e) => return (Vec::new(), Err(e)),
        };

        self.ctx.model().lock().await.apply(&JobPatch {
            output: Some(names.clone()),
            ..JobPatch::default()
        });

        let output_dir = staging.output_dir();
        let storage = &self.collab.storage;
        let uploads = names.iter().map(|name| {
            let path = output_dir.join(name);
            async move {
                let file = tokio::fs::File::open(&path)
                    .await
                    .map_err(|e| UploadFailure {
                        file: name.clone(),
                        cause: format!("opening {:?}: {e}", path),
                    })?;
                storage
                    .create_file(container, name, Box::new(file))
                    .await
                    .map_err(|e| UploadFailure {
                        file: name.clone(),
                        cause: e.to_string(),
                    })?;
                debug!(job_id, file = %name, container, "output uploaded");
                Ok::<(), UploadFailure>(())
            }
        });

        // Every upload settles before the outcome is decided.
        let failures: Vec<UploadFailure> = join_all(uploads)
            .await
            .into_iter()
            .filter_map(|r| r.err())
            .collect();

        if failures.is_empty() {
            info!(job_id, container, files = names.len(), "outputs uploaded");
            (names, Ok(()))
        } else {
            error!(job_id, container, failed = failures.len(), "output upload failed");
            (names, Err(ComputeError::Upload { failures }))
        }
    }
}

impl JobExecutor for ScriptJobExecutor {
    fn job_id(&self) -> &str {
        self.ctx.job_id()
    }

    fn state(&self) -> ExecutorState {
        self.ctx.state()
    }

    fn fetch_model(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.ctx.fetch_model())
    }

    fn pre_execution(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.prepare())
    }

    fn start_execution(&self) -> BoxFuture<'_, Result<JobStatus>> {
        Box::pin(async move {
            let ran = self.run().await;
            if let Err(e @ ComputeError::InvalidState { .. }) = ran {
                // Nothing was started; leave the lifecycle untouched.
                return Err(e);
            }

            let finished = self.finalize().await;
            match (ran, finished) {
                (Err(run_err), Err(post_err)) => {
                    error!(
                        job_id = %self.ctx.job_id(),
                        error = %post_err,
                        "post-execution failed after a failed run"
                    );
                    Err(run_err)
                }
                (Err(run_err), Ok(_)) => Err(run_err),
                (Ok(()), finished) => finished,
            }
        })
    }

    fn stop_execution(&self) -> BoxFuture<'_, Result<StopOutcome>> {
        Box::pin(self.ctx.stop())
    }

    fn post_execution(&self) -> BoxFuture<'_, Result<JobStatus>> {
        Box::pin(self.finalize())
    }
}
