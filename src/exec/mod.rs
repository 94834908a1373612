// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`runner`] defines the `ProcessRunner` / `RunningProcess` traits, the
//!   argument-vector `Invocation`, and the `tokio::process` implementation.
//! - [`capture`] drains stdout/stderr, logging lines and keeping a bounded
//!   tail for diagnostics.
//! - [`supervisor`] owns a spawned process in a background task so that it
//!   can be cancelled (kill + confirmed reap) from another task.

pub mod capture;
pub mod runner;
pub mod supervisor;

pub use runner::{Invocation, ProcessOutput, ProcessRunner, RunningProcess, TokioProcessRunner};
pub use supervisor::{ActiveProcess, ProcessExit, supervise};
