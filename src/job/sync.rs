// src/job/sync.rs

//! Executor-side working copy of a job document.

use std::sync::Arc;

use tracing::debug;

use crate::errors::{ComputeError, Result};
use crate::store::JobStore;

use super::{Job, JobPatch};

/// Cached, mutable copy of one job document.
///
/// Local changes go through [`JobModel::push`], which applies the patch to
/// the cached copy and forwards the same patch to the job store, so the two
/// never diverge on the fields the executor owns (status, output,
/// diagnostics, timestamps).
pub struct JobModel {
    job_id: String,
    cached: Option<Job>,
    store: Arc<dyn JobStore>,
}

impl std::fmt::Debug for JobModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobModel")
            .field("job_id", &self.job_id)
            .field("cached", &self.cached)
            .finish_non_exhaustive()
    }
}

impl JobModel {
    pub fn new(job_id: impl Into<String>, store: Arc<dyn JobStore>) -> Self {
        Self {
            job_id: job_id.into(),
            cached: None,
            store,
        }
    }

    /// Start from an already-loaded document.
    pub fn with_job(job: Job, store: Arc<dyn JobStore>) -> Self {
        Self {
            job_id: job.id.clone(),
            cached: Some(job),
            store,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn job(&self) -> Option<&Job> {
        self.cached.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.cached.is_some()
    }

    /// Reload the document from the store, replacing the cached copy.
    pub async fn fetch(&mut self) -> Result<&Job> {
        let job = self.store.get(&self.job_id).await?;
        debug!(job_id = %self.job_id, status = %job.status, "job model fetched");
        Ok(self.cached.insert(job))
    }

    /// Apply a patch to the cached copy only.
    pub fn apply(&mut self, patch: &JobPatch) {
        if let Some(job) = self.cached.as_mut() {
            job.apply(patch);
        }
    }

    /// Apply a patch locally, then persist it.
    pub async fn push(&mut self, patch: JobPatch) -> Result<()> {
        if self.cached.is_none() {
            return Err(ComputeError::InvalidState {
                operation: "push job model",
                state: "model not loaded".to_string(),
            });
        }
        self.apply(&patch);
        debug!(job_id = %self.job_id, status = ?patch.status, "pushing job model update");
        self.store.update(&self.job_id, patch).await
    }
}
