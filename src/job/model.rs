// src/job/model.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted status of a job document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Created,
    Queued,
    Running,
    Completed,
    Failed,
    Aborted,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Aborted
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Aborted => "aborted",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "created" => Ok(JobStatus::Created),
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "aborted" => Ok(JobStatus::Aborted),
            other => Err(format!("invalid job status: {other}")),
        }
    }
}

fn default_language() -> String {
    "python".to_string()
}

/// A job document as stored in the job store.
///
/// ```json
/// {
///   "id": "job-42",
///   "type": "python",
///   "params": ["--rows", "10"],
///   "status": "queued",
///   "output": []
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,

    /// Language tag used to pick the executor variant.
    #[serde(rename = "type", default = "default_language")]
    pub language: String,

    /// Opaque arguments handed to the algorithm, in order.
    #[serde(default)]
    pub params: Vec<String>,

    #[serde(default)]
    pub status: JobStatus,

    /// Names of the artifacts uploaded by the last execution attempt.
    #[serde(default)]
    pub output: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Job {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            language: default_language(),
            params: Vec::new(),
            status: JobStatus::default(),
            output: Vec::new(),
            exit_code: None,
            stdout: None,
            stderr: None,
            start_date: None,
            end_date: None,
            message: None,
        }
    }

    /// Apply the fields present in `patch`, leaving the rest untouched.
    ///
    /// A patch that starts a new attempt first drops everything the previous
    /// attempt recorded.
    pub fn apply(&mut self, patch: &JobPatch) {
        if patch.new_attempt {
            self.clear_attempt();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(ref output) = patch.output {
            self.output = output.clone();
        }
        if let Some(code) = patch.exit_code {
            self.exit_code = Some(code);
        }
        if let Some(ref stdout) = patch.stdout {
            self.stdout = Some(stdout.clone());
        }
        if let Some(ref stderr) = patch.stderr {
            self.stderr = Some(stderr.clone());
        }
        if let Some(start) = patch.start_date {
            self.start_date = Some(start);
        }
        if let Some(end) = patch.end_date {
            self.end_date = Some(end);
        }
        if let Some(ref message) = patch.message {
            self.message = Some(message.clone());
        }
    }

    fn clear_attempt(&mut self) {
        self.output.clear();
        self.exit_code = None;
        self.stdout = None;
        self.stderr = None;
        self.start_date = None;
        self.end_date = None;
        self.message = None;
    }
}

/// Partial update of a job document. `None` fields are left unchanged.
///
/// With `new_attempt` set, the per-attempt fields (`output`, `exitCode`,
/// `stdout`, `stderr`, `startDate`, `endDate`, `message`) are cleared before
/// the patch is applied, so the document only describes the latest attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPatch {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub new_attempt: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl JobPatch {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}
