// src/executor/mod.rs

//! Job executors.
//!
//! A job executor drives one execution attempt of one job through a fixed
//! lifecycle (see [`lifecycle`]):
//!
//! 1. [`JobExecutor::fetch_model`] loads the job document,
//! 2. [`JobExecutor::pre_execution`] stages inputs,
//! 3. [`JobExecutor::start_execution`] runs the job and then always runs
//!    post-execution (upload + cleanup),
//! 4. [`JobExecutor::stop_execution`] may be called concurrently with the
//!    start to terminate the run early.
//!
//! Executors are variants picked by the job's language tag
//! ([`ExecutorKind`]); the only concrete variant today is
//! [`ScriptJobExecutor`], which runs an interpreter over the algorithm
//! source.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::errors::{ComputeError, Result};
use crate::exec::ProcessRunner;
use crate::job::JobStatus;
use crate::store::{AlgorithmRepository, JobStore, ObjectStorage};

pub mod context;
pub mod driver;
pub mod factory;
pub mod lifecycle;
pub mod script;
pub mod staging;

pub use context::{ExecutionContext, RunRecord};
pub use driver::drive_job;
pub use factory::ExecutorFactory;
pub use lifecycle::{ExecutorState, Operation};
pub use script::{ScriptJobExecutor, ScriptSettings};
pub use staging::StagingArea;

/// The capability set every executor variant provides.
pub trait JobExecutor: Send + Sync {
    fn job_id(&self) -> &str;

    fn state(&self) -> ExecutorState;

    /// Load the job document. Fails with `NotFound` for unknown ids.
    fn fetch_model(&self) -> BoxFuture<'_, Result<()>>;

    /// Stage everything the run needs. Leaves the executor `Prepared`, or
    /// `Failed` with a `Staging` error.
    fn pre_execution(&self) -> BoxFuture<'_, Result<()>>;

    /// Run the job, then run post-execution. Resolves with the final job
    /// status once outputs are persisted and the staging area is gone.
    fn start_execution(&self) -> BoxFuture<'_, Result<JobStatus>>;

    /// Terminate a running job and resolve once termination is confirmed.
    fn stop_execution(&self) -> BoxFuture<'_, Result<StopOutcome>>;

    /// Upload outputs, persist the final job document and clean up.
    fn post_execution(&self) -> BoxFuture<'_, Result<JobStatus>>;
}

/// Result of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOutcome {
    /// Executor state once the stop was handled.
    pub state: ExecutorState,
    /// Whether this stop actually terminated a running process.
    pub terminated: bool,
}

impl StopOutcome {
    pub fn noop(state: ExecutorState) -> Self {
        Self {
            state,
            terminated: false,
        }
    }
}

/// External collaborators shared by every executor on the node.
#[derive(Clone)]
pub struct Collaborators {
    pub jobs: Arc<dyn JobStore>,
    pub algorithms: Arc<dyn AlgorithmRepository>,
    pub storage: Arc<dyn ObjectStorage>,
    pub runner: Arc<dyn ProcessRunner>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Executor variant selected from a job's language tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    /// Interpreted script run through the Python runner.
    Python,
}

impl FromStr for ExecutorKind {
    type Err = ComputeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "python" | "python3" | "py" => Ok(ExecutorKind::Python),
            other => Err(ComputeError::UnsupportedLanguage(other.to_string())),
        }
    }
}
