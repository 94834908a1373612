// src/store/mod.rs

//! Collaborator interfaces the executor talks to.
//!
//! The executor never reaches for a database or object-store client
//! directly; it goes through these traits so the node can be backed by the
//! local-directory implementations in [`local`] (used by the binary) or by
//! in-memory fakes in tests.
//!
//! All methods return boxed futures so the traits stay object safe and can
//! be shared as `Arc<dyn ...>` between executor instances.

use std::path::Path;

use futures::future::BoxFuture;
use tokio::io::AsyncRead;

use crate::errors::Result;
use crate::job::{Job, JobPatch};

pub mod local;

pub use local::{LocalAlgorithmRepository, LocalJobStore, LocalObjectStorage};

/// Readable byte stream handed to object storage.
pub type ArtifactReader = Box<dyn AsyncRead + Send + Unpin>;

/// Persistent collection of job documents.
pub trait JobStore: Send + Sync {
    /// Load a job document. Fails with `ComputeError::NotFound` if absent.
    fn get<'a>(&'a self, job_id: &'a str) -> BoxFuture<'a, Result<Job>>;

    /// Ask the store to materialise the job's input data into `input_dir`.
    ///
    /// The returned future resolves only once the data is in place.
    fn materialize_data<'a>(
        &'a self,
        job_id: &'a str,
        input_dir: &'a Path,
    ) -> BoxFuture<'a, Result<()>>;

    /// Apply a partial update to a stored job document.
    fn update<'a>(&'a self, job_id: &'a str, patch: JobPatch) -> BoxFuture<'a, Result<()>>;
}

/// Store of algorithm source code, keyed by job id.
pub trait AlgorithmRepository: Send + Sync {
    fn source_code<'a>(&'a self, job_id: &'a str) -> BoxFuture<'a, Result<Vec<u8>>>;
}

/// Content store organised into named containers holding named files.
pub trait ObjectStorage: Send + Sync {
    /// Create a container. Succeeds if it already exists.
    fn create_container<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Store the full contents of `reader` as `container/name`.
    fn create_file<'a>(
        &'a self,
        container: &'a str,
        name: &'a str,
        reader: ArtifactReader,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Deterministic output container name for a job.
pub fn output_container_name(job_id: &str) -> String {
    format!("{job_id}_output")
}
