// src/exec/supervisor.rs

//! Supervision of a single spawned process.
//!
//! The process is moved into its own Tokio task which races the natural
//! exit against a cancellation request. The owner keeps an
//! [`ActiveProcess`] with the cancel sender and an abort handle:
//!
//! - sending on the cancel channel kills the process and waits for it to be
//!   reaped before the task finishes,
//! - aborting the task drops the process, which is killed on drop.

use tokio::sync::oneshot;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use super::runner::{ProcessOutput, RunningProcess};

/// How a supervised process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessExit {
    /// Exited on its own.
    Exited(ProcessOutput),
    /// Killed on request; termination was confirmed.
    Killed(Option<ProcessOutput>),
    /// Kill was requested but could not be confirmed.
    KillFailed(String),
    /// Waiting on the process failed.
    WaitFailed(String),
}

/// Owner-side record of a supervised process.
#[derive(Debug)]
pub struct ActiveProcess {
    cancel: Option<oneshot::Sender<()>>,
    abort: AbortHandle,
}

impl ActiveProcess {
    /// Ask the supervisor to kill the process.
    ///
    /// Only the first call sends anything; returns whether this call did.
    pub fn request_cancel(&mut self) -> bool {
        match self.cancel.take() {
            Some(cancel) => {
                if cancel.send(()).is_err() {
                    debug!("process already finished while cancelling");
                }
                true
            }
            None => false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }

    /// Tear the supervisor down without waiting; the process is killed on drop.
    pub fn abort(&self) {
        self.abort.abort();
    }
}

/// Move `process` into a supervising task.
///
/// `on_exit` runs inside the task as soon as the outcome is known, before
/// the join handle resolves, so observers see the final state even if
/// nobody awaits the handle.
pub fn supervise<F>(
    label: String,
    mut process: Box<dyn RunningProcess>,
    on_exit: F,
) -> (ActiveProcess, JoinHandle<ProcessExit>)
where
    F: FnOnce(&ProcessExit) + Send + 'static,
{
    let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        let exit = tokio::select! {
            waited = process.wait() => match waited {
                Ok(output) => {
                    info!(
                        job_id = %label,
                        exit_code = ?output.exit_code,
                        success = output.success,
                        "process exited"
                    );
                    ProcessExit::Exited(output)
                }
                Err(e) => ProcessExit::WaitFailed(e.to_string()),
            },

            cancel = &mut cancel_rx => match cancel {
                Ok(()) => {
                    info!(job_id = %label, "cancellation requested; killing process");
                    match process.kill().await {
                        Ok(()) => ProcessExit::Killed(process.wait().await.ok()),
                        Err(e) => {
                            warn!(job_id = %label, error = %e, "failed to kill process");
                            ProcessExit::KillFailed(e.to_string())
                        }
                    }
                }
                Err(_) => {
                    // Owner went away without cancelling; keep waiting.
                    match process.wait().await {
                        Ok(output) => ProcessExit::Exited(output),
                        Err(e) => ProcessExit::WaitFailed(e.to_string()),
                    }
                }
            },
        };

        on_exit(&exit);
        exit
    });

    let active = ActiveProcess {
        cancel: Some(cancel_tx),
        abort: handle.abort_handle(),
    };

    (active, handle)
}
