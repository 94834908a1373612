// src/exec/runner.rs

//! Process runner: spawn, wait for and kill OS processes.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::errors::{ComputeError, Result};

use super::capture::spawn_capture;

/// A program plus a discrete argument vector.
///
/// Arguments are handed to the OS as-is; nothing is ever joined into a
/// string for a shell to re-parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub current_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }
}

impl fmt::Display for Invocation {
    /// Debug-quoted rendering for logs only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.program)?;
        for arg in &self.args {
            write!(f, " {:?}", arg)?;
        }
        Ok(())
    }
}

/// What a process left behind once it exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Handle to a spawned process.
pub trait RunningProcess: Send {
    fn id(&self) -> Option<u32>;

    /// Wait for the process to exit and collect its captured output.
    fn wait(&mut self) -> BoxFuture<'_, Result<ProcessOutput>>;

    /// Kill the process and wait until it has been reaped.
    fn kill(&mut self) -> BoxFuture<'_, Result<()>>;
}

/// Facility that turns an [`Invocation`] into a running process.
pub trait ProcessRunner: Send + Sync {
    /// `label` tags log lines emitted for this process (usually the job id).
    fn spawn(&self, label: &str, invocation: &Invocation) -> Result<Box<dyn RunningProcess>>;
}

/// Production runner built on `tokio::process`.
#[derive(Debug, Clone)]
pub struct TokioProcessRunner {
    max_captured_lines: usize,
}

impl TokioProcessRunner {
    pub fn new(max_captured_lines: usize) -> Self {
        Self { max_captured_lines }
    }
}

impl Default for TokioProcessRunner {
    fn default() -> Self {
        Self::new(200)
    }
}

impl ProcessRunner for TokioProcessRunner {
    fn spawn(&self, label: &str, invocation: &Invocation) -> Result<Box<dyn RunningProcess>> {
        info!(job_id = %label, command = %invocation, "spawning process");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = invocation.current_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| ComputeError::Process {
            exit_code: None,
            cause: format!("spawning {:?}: {e}", invocation.program),
        })?;

        let stdout = child
            .stdout
            .take()
            .map(|s| spawn_capture(s, label.to_string(), "stdout", self.max_captured_lines));
        let stderr = child
            .stderr
            .take()
            .map(|s| spawn_capture(s, label.to_string(), "stderr", self.max_captured_lines));

        debug!(job_id = %label, pid = ?child.id(), "process spawned");

        Ok(Box::new(TokioProcess {
            child,
            stdout,
            stderr,
        }))
    }
}

struct TokioProcess {
    child: Child,
    stdout: Option<JoinHandle<String>>,
    stderr: Option<JoinHandle<String>>,
}

/// How long to keep draining streams after the process itself has exited.
/// Grandchildren that inherited the pipes can otherwise keep them open.
const CAPTURE_GRACE: Duration = Duration::from_secs(2);

async fn collect(handle: Option<JoinHandle<String>>) -> String {
    let Some(mut handle) = handle else {
        return String::new();
    };
    match tokio::time::timeout(CAPTURE_GRACE, &mut handle).await {
        Ok(joined) => joined.unwrap_or_default(),
        Err(_) => {
            handle.abort();
            String::new()
        }
    }
}

impl RunningProcess for TokioProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn wait(&mut self) -> BoxFuture<'_, Result<ProcessOutput>> {
        Box::pin(async move {
            let status = self.child.wait().await.map_err(|e| ComputeError::Process {
                exit_code: None,
                cause: format!("waiting for process: {e}"),
            })?;

            let stdout = collect(self.stdout.take()).await;
            let stderr = collect(self.stderr.take()).await;

            Ok(ProcessOutput {
                exit_code: status.code(),
                success: status.success(),
                stdout,
                stderr,
            })
        })
    }

    fn kill(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            // `Child::kill` sends the signal and then waits for the exit.
            self.child
                .kill()
                .await
                .map_err(|e| ComputeError::Termination(format!("killing process: {e}")))
        })
    }
}
