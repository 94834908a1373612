// src/executor/lifecycle.rs

//! Pure lifecycle state machine shared by every executor variant.
//!
//! ```text
//! Created -> ModelLoaded -> Prepared -> Running -> {Completed | Failed | Aborted} -> CleanedUp
//! ```
//!
//! Preparation may fail straight to `Failed`, and a prepared executor that
//! is never started can be wound down through `Aborted`. Nothing in here
//! does IO; the rules are checked by [`ExecutionContext`] before any side
//! effect happens.
//!
//! [`ExecutionContext`]: super::context::ExecutionContext

use std::fmt;

use crate::errors::{ComputeError, Result};
use crate::job::JobStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutorState {
    Created,
    ModelLoaded,
    Prepared,
    Running,
    Completed,
    Failed,
    Aborted,
    CleanedUp,
}

impl ExecutorState {
    pub const ALL: [ExecutorState; 8] = [
        ExecutorState::Created,
        ExecutorState::ModelLoaded,
        ExecutorState::Prepared,
        ExecutorState::Running,
        ExecutorState::Completed,
        ExecutorState::Failed,
        ExecutorState::Aborted,
        ExecutorState::CleanedUp,
    ];

    /// Whether the run itself is over (the process, if any, is gone).
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            ExecutorState::Completed
                | ExecutorState::Failed
                | ExecutorState::Aborted
                | ExecutorState::CleanedUp
        )
    }

    /// Job status matching a finished run.
    pub fn outcome_status(self) -> Option<JobStatus> {
        match self {
            ExecutorState::Completed => Some(JobStatus::Completed),
            ExecutorState::Failed => Some(JobStatus::Failed),
            ExecutorState::Aborted => Some(JobStatus::Aborted),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutorState::Created => "created",
            ExecutorState::ModelLoaded => "model_loaded",
            ExecutorState::Prepared => "prepared",
            ExecutorState::Running => "running",
            ExecutorState::Completed => "completed",
            ExecutorState::Failed => "failed",
            ExecutorState::Aborted => "aborted",
            ExecutorState::CleanedUp => "cleaned_up",
        }
    }
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contract operations, used for entry checks and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    FetchModel,
    PreExecution,
    StartExecution,
    StopExecution,
    PostExecution,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::FetchModel => "fetch model",
            Operation::PreExecution => "run pre-execution",
            Operation::StartExecution => "start execution",
            Operation::StopExecution => "stop execution",
            Operation::PostExecution => "run post-execution",
        }
    }

    /// States from which this operation may be invoked.
    pub fn allowed_from(self, state: ExecutorState) -> bool {
        use ExecutorState::*;
        match self {
            Operation::FetchModel => matches!(state, Created | ModelLoaded),
            Operation::PreExecution => state == ModelLoaded,
            Operation::StartExecution => state == Prepared,
            // A stop outside `Running` is a no-op, never an error.
            Operation::StopExecution => true,
            Operation::PostExecution => {
                matches!(state, Prepared | Running | Completed | Failed | Aborted)
            }
        }
    }
}

/// Check that `op` may run in `state`.
pub fn check(op: Operation, state: ExecutorState) -> Result<()> {
    if op.allowed_from(state) {
        Ok(())
    } else {
        Err(ComputeError::InvalidState {
            operation: op.as_str(),
            state: state.to_string(),
        })
    }
}

/// Whether `from -> to` is an edge of the lifecycle graph.
pub fn can_transition(from: ExecutorState, to: ExecutorState) -> bool {
    use ExecutorState::*;
    matches!(
        (from, to),
        (Created, ModelLoaded)
            | (ModelLoaded, ModelLoaded)
            | (ModelLoaded, Prepared)
            | (ModelLoaded, Failed)
            | (Prepared, Running)
            | (Prepared, Failed)
            | (Prepared, Aborted)
            | (Running, Completed)
            | (Running, Failed)
            | (Running, Aborted)
            | (Completed, CleanedUp)
            | (Failed, CleanedUp)
            | (Aborted, CleanedUp)
    )
}

/// Validate a transition, returning the new state.
pub fn transition(from: ExecutorState, to: ExecutorState) -> Result<ExecutorState> {
    if can_transition(from, to) {
        Ok(to)
    } else {
        Err(ComputeError::InvalidState {
            operation: "change state",
            state: format!("{from} (requested {to})"),
        })
    }
}
