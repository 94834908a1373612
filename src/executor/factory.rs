// src/executor/factory.rs

//! Pick and construct the executor variant for a job.

use std::sync::Arc;

use tracing::debug;

use crate::errors::Result;

use super::script::{ScriptJobExecutor, ScriptSettings};
use super::{Collaborators, ExecutorKind, JobExecutor};

/// Builds executors from the node configuration and shared collaborators.
#[derive(Debug, Clone)]
pub struct ExecutorFactory {
    script: ScriptSettings,
    collab: Collaborators,
}

impl ExecutorFactory {
    pub fn new(script: ScriptSettings, collab: Collaborators) -> Self {
        Self { script, collab }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collab
    }

    /// Load the job document and build the executor its language tag asks
    /// for. The returned executor already holds the model.
    pub async fn create(&self, job_id: &str) -> Result<Arc<dyn JobExecutor>> {
        let job = self.collab.jobs.get(job_id).await?;
        let kind: ExecutorKind = job.language.parse()?;
        debug!(job_id, ?kind, "executor selected");

        let executor: Arc<dyn JobExecutor> = match kind {
            ExecutorKind::Python => Arc::new(ScriptJobExecutor::with_job(
                job,
                self.script.clone(),
                self.collab.clone(),
            )),
        };
        Ok(executor)
    }
}
