// src/engine/runtime.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::{ComputeError, Result};
use crate::executor::{ExecutorFactory, JobExecutor, StopOutcome, drive_job};

use super::{JobId, JobReport, RunSummary, RuntimeEvent, RuntimeOptions};

/// Event loop turning start/stop requests into executor calls.
///
/// Each started job runs in its own Tokio task and reports back with
/// `JobFinished`; the loop itself never awaits a job, so stop requests are
/// handled while jobs run.
pub struct Runtime {
    factory: ExecutorFactory,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    event_tx: mpsc::Sender<RuntimeEvent>,
    options: RuntimeOptions,
    /// At most one executor per job id.
    active: HashMap<JobId, Arc<dyn JobExecutor>>,
    summary: RunSummary,
    shutting_down: bool,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("options", &self.options)
            .field("active", &self.active.keys().collect::<Vec<_>>())
            .field("shutting_down", &self.shutting_down)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// `event_tx` must feed `event_rx`; job tasks use it to report back.
    pub fn new(
        factory: ExecutorFactory,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        event_tx: mpsc::Sender<RuntimeEvent>,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            factory,
            event_rx,
            event_tx,
            options,
            active: HashMap::new(),
            summary: RunSummary::default(),
            shutting_down: false,
        }
    }

    /// Main event loop. Returns the reports of every start request handled.
    pub async fn run(mut self) -> Result<RunSummary> {
        info!("compute runtime started");

        while !self.should_exit() {
            let Some(event) = self.event_rx.recv().await else {
                info!("runtime event channel closed; exiting");
                break;
            };
            debug!(?event, "runtime received event");
            self.handle(event).await;
        }

        info!(jobs = self.summary.reports.len(), "runtime exiting");
        Ok(self.summary)
    }

    fn should_exit(&self) -> bool {
        if !self.active.is_empty() {
            return false;
        }
        self.shutting_down || (self.options.exit_when_idle && self.event_rx.is_empty())
    }

    async fn handle(&mut self, event: RuntimeEvent) {
        match event {
            RuntimeEvent::StartJob { job_id } => self.start_job(job_id).await,
            RuntimeEvent::StopJob { job_id, reply } => {
                let result = match self.active.get(&job_id) {
                    Some(executor) => {
                        let executor = Arc::clone(executor);
                        let timeout = self.options.stop_timeout;
                        tokio::spawn(async move {
                            let outcome = stop_with_timeout(executor, timeout).await;
                            if let Some(reply) = reply {
                                let _ = reply.send(outcome);
                            }
                        });
                        return;
                    }
                    None => Err(ComputeError::NotFound(job_id.clone())),
                };
                warn!(job_id = %job_id, "stop requested for a job that is not active");
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            RuntimeEvent::JobFinished { job_id, result } => {
                self.active.remove(&job_id);
                match &result {
                    Ok(status) => info!(job_id = %job_id, %status, "job finished"),
                    Err(e) => warn!(job_id = %job_id, error = %e, "job failed"),
                }
                self.summary.reports.push(JobReport { job_id, result });
            }
            RuntimeEvent::ShutdownRequested => {
                info!(active = self.active.len(), "shutdown requested; stopping active jobs");
                self.shutting_down = true;
                for (job_id, executor) in self.active.iter() {
                    let executor = Arc::clone(executor);
                    let job_id = job_id.clone();
                    let timeout = self.options.stop_timeout;
                    tokio::spawn(async move {
                        if let Err(e) = stop_with_timeout(executor, timeout).await {
                            warn!(job_id = %job_id, error = %e, "stop during shutdown failed");
                        }
                    });
                }
            }
        }
    }

    async fn start_job(&mut self, job_id: JobId) {
        if self.shutting_down {
            warn!(job_id = %job_id, "shutting down; start request ignored");
            self.refuse(job_id, "node is shutting down".to_string());
            return;
        }

        if self.active.contains_key(&job_id) {
            let err = ComputeError::DuplicateExecution(job_id.clone());
            warn!(job_id = %job_id, error = %err, "start request refused");
            self.refuse(job_id, err.to_string());
            return;
        }

        let executor = match self.factory.create(&job_id).await {
            Ok(executor) => executor,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "could not create executor");
                self.refuse(job_id, e.to_string());
                return;
            }
        };

        self.active.insert(job_id.clone(), Arc::clone(&executor));

        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = drive_job(executor.as_ref())
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(RuntimeEvent::JobFinished { job_id, result }).await;
        });
    }

    fn refuse(&mut self, job_id: JobId, reason: String) {
        self.summary.reports.push(JobReport {
            job_id,
            result: Err(reason),
        });
    }
}

async fn stop_with_timeout(
    executor: Arc<dyn JobExecutor>,
    timeout: Option<Duration>,
) -> Result<StopOutcome> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, executor.stop_execution())
            .await
            .map_err(|_| {
                ComputeError::Termination(format!("stop not confirmed within {limit:?}"))
            })?,
        None => executor.stop_execution().await,
    }
}
