// src/errors.rs

//! Crate-wide error taxonomy and helpers.

use std::fmt;

use thiserror::Error;

/// One output file that failed to reach object storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    pub file: String,
    pub cause: String,
}

impl fmt::Display for UploadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.file, self.cause)
    }
}

fn join_failures(failures: &[UploadFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum ComputeError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Invalid state: cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("Staging error: {0}")]
    Staging(String),

    #[error("Process error (exit code {exit_code:?}): {cause}")]
    Process {
        exit_code: Option<i32>,
        cause: String,
    },

    #[error("Uploading {} output file(s) failed: {}", failures.len(), join_failures(failures))]
    Upload { failures: Vec<UploadFailure> },

    #[error("Termination error: {0}")]
    Termination(String),

    #[error("Job store error: {0}")]
    Store(String),

    #[error("Unsupported job language: {0}")]
    UnsupportedLanguage(String),

    #[error("Job {0} is already being executed on this node")]
    DuplicateExecution(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ComputeError {
    /// Wrap any displayable error chain as a staging failure.
    pub fn staging(err: impl Into<anyhow::Error>) -> Self {
        ComputeError::Staging(format!("{:#}", err.into()))
    }

    pub fn store(err: impl Into<anyhow::Error>) -> Self {
        ComputeError::Store(format!("{:#}", err.into()))
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ComputeError>;
