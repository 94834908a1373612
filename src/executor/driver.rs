// src/executor/driver.rs

//! Drive one executor through its whole lifecycle.

use tracing::{info, warn};

use crate::errors::Result;
use crate::job::JobStatus;

use super::JobExecutor;

/// `fetch_model -> pre_execution -> start_execution`.
///
/// Start runs post-execution itself. If preparation fails, post-execution
/// is invoked here so the staging area is still cleaned up and the failure
/// is persisted. A failed fetch stops everything: there is nothing to
/// clean up yet.
pub async fn drive_job(executor: &dyn JobExecutor) -> Result<JobStatus> {
    let job_id = executor.job_id().to_string();

    executor.fetch_model().await?;

    if let Err(e) = executor.pre_execution().await {
        if let Err(post) = executor.post_execution().await {
            warn!(job_id = %job_id, error = %post, "cleanup after failed preparation also failed");
        }
        return Err(e);
    }

    let status = executor.start_execution().await?;
    info!(job_id = %job_id, %status, "job finished");
    Ok(status)
}
