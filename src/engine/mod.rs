// src/engine/mod.rs

//! Caller-facing trigger surface.
//!
//! The node receives "start job" / "stop job" requests as [`RuntimeEvent`]s
//! on an mpsc channel (from the CLI, Ctrl-C handling, or any transport
//! layer built on top). The [`Runtime`] event loop turns them into executor
//! calls:
//! - start: build an executor and drive it to completion in its own task,
//! - stop: call `stop_execution` on the matching executor,
//! - at most one active execution per job id.

use std::fmt;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::errors::Result;
use crate::executor::StopOutcome;
use crate::job::JobStatus;

pub mod runtime;

pub use runtime::Runtime;

/// Canonical job id type used throughout the engine.
pub type JobId = String;

/// Events flowing into the runtime.
pub enum RuntimeEvent {
    /// Fetch, prepare and run a job.
    StartJob { job_id: JobId },
    /// Stop a running job. The reply, if any, receives the stop outcome.
    StopJob {
        job_id: JobId,
        reply: Option<oneshot::Sender<Result<StopOutcome>>>,
    },
    /// A job's driver finished (sent by the runtime's own job tasks).
    JobFinished {
        job_id: JobId,
        result: std::result::Result<JobStatus, String>,
    },
    /// Graceful shutdown requested (e.g. Ctrl-C): stop everything, then exit.
    ShutdownRequested,
}

impl fmt::Debug for RuntimeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeEvent::StartJob { job_id } => {
                f.debug_struct("StartJob").field("job_id", job_id).finish()
            }
            RuntimeEvent::StopJob { job_id, reply } => f
                .debug_struct("StopJob")
                .field("job_id", job_id)
                .field("reply", &reply.is_some())
                .finish(),
            RuntimeEvent::JobFinished { job_id, result } => f
                .debug_struct("JobFinished")
                .field("job_id", job_id)
                .field("result", result)
                .finish(),
            RuntimeEvent::ShutdownRequested => f.write_str("ShutdownRequested"),
        }
    }
}

/// Runtime options.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// Exit once no job is active and no event is waiting (CLI mode).
    pub exit_when_idle: bool,
    /// Bound layered around `stop_execution`; `None` waits forever.
    pub stop_timeout: Option<Duration>,
}

/// Final word on one start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub job_id: JobId,
    pub result: std::result::Result<JobStatus, String>,
}

impl JobReport {
    pub fn completed(&self) -> bool {
        matches!(self.result, Ok(JobStatus::Completed))
    }
}

/// Everything the runtime did before it exited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub reports: Vec<JobReport>,
}

impl RunSummary {
    pub fn all_completed(&self) -> bool {
        self.reports.iter().all(JobReport::completed)
    }

    pub fn report(&self, job_id: &str) -> Option<&JobReport> {
        self.reports.iter().find(|r| r.job_id == job_id)
    }
}
