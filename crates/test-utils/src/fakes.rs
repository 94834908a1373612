//! In-memory collaborators for executor tests.
//!
//! Each fake records what the executor asked of it so tests can assert on
//! call order and payloads without touching a real store.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::io::AsyncReadExt;

use eae_compute::errors::{ComputeError, Result};
use eae_compute::exec::{Invocation, ProcessRunner, RunningProcess, TokioProcessRunner};
use eae_compute::job::{Job, JobPatch};
use eae_compute::store::{AlgorithmRepository, ArtifactReader, JobStore, ObjectStorage};

/// Job store holding documents and per-job datasets in memory.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, Job>>,
    datasets: Mutex<HashMap<String, Vec<(String, Vec<u8>)>>>,
    materialized: Mutex<Vec<(String, PathBuf)>>,
    updates: Mutex<Vec<(String, JobPatch)>>,
    fail_materialize: Mutex<bool>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: Job) {
        self.jobs.lock().unwrap().insert(job.id.clone(), job);
    }

    /// Add a file that `materialize_data` writes into the input directory.
    pub fn add_dataset_file(&self, job_id: &str, name: &str, contents: &[u8]) {
        self.datasets
            .lock()
            .unwrap()
            .entry(job_id.to_string())
            .or_default()
            .push((name.to_string(), contents.to_vec()));
    }

    pub fn fail_materialize(&self) {
        *self.fail_materialize.lock().unwrap() = true;
    }

    pub fn job(&self, job_id: &str) -> Option<Job> {
        self.jobs.lock().unwrap().get(job_id).cloned()
    }

    pub fn updates(&self) -> Vec<(String, JobPatch)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn materialize_calls(&self) -> Vec<(String, PathBuf)> {
        self.materialized.lock().unwrap().clone()
    }
}

impl JobStore for MemoryJobStore {
    fn get<'a>(&'a self, job_id: &'a str) -> BoxFuture<'a, Result<Job>> {
        Box::pin(async move {
            self.job(job_id)
                .ok_or_else(|| ComputeError::NotFound(job_id.to_string()))
        })
    }

    fn materialize_data<'a>(
        &'a self,
        job_id: &'a str,
        input_dir: &'a Path,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.materialized
                .lock()
                .unwrap()
                .push((job_id.to_string(), input_dir.to_path_buf()));

            if *self.fail_materialize.lock().unwrap() {
                return Err(ComputeError::Store("dataset unavailable".to_string()));
            }

            let files = self
                .datasets
                .lock()
                .unwrap()
                .get(job_id)
                .cloned()
                .unwrap_or_default();
            for (name, contents) in files {
                tokio::fs::write(input_dir.join(name), contents).await?;
            }
            Ok(())
        })
    }

    fn update<'a>(&'a self, job_id: &'a str, patch: JobPatch) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs
                .get_mut(job_id)
                .ok_or_else(|| ComputeError::NotFound(job_id.to_string()))?;
            job.apply(&patch);
            self.updates
                .lock()
                .unwrap()
                .push((job_id.to_string(), patch));
            Ok(())
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryAlgorithmRepository {
    sources: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryAlgorithmRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job_id: &str, source: &[u8]) {
        self.sources
            .lock()
            .unwrap()
            .insert(job_id.to_string(), source.to_vec());
    }
}

impl AlgorithmRepository for MemoryAlgorithmRepository {
    fn source_code<'a>(&'a self, job_id: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            self.sources
                .lock()
                .unwrap()
                .get(job_id)
                .cloned()
                .ok_or_else(|| ComputeError::NotFound(format!("algorithm for {job_id}")))
        })
    }
}

/// Object storage that keeps uploaded bytes and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingObjectStorage {
    containers: Mutex<Vec<String>>,
    files: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    failing_files: Mutex<HashSet<String>>,
    fail_containers: Mutex<bool>,
    upload_delay: Mutex<Option<Duration>>,
    create_file_calls: AtomicUsize,
    settled: AtomicUsize,
}

impl RecordingObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `create_file` for `name` fail.
    pub fn fail_file(&self, name: &str) {
        self.failing_files.lock().unwrap().insert(name.to_string());
    }

    pub fn fail_containers(&self) {
        *self.fail_containers.lock().unwrap() = true;
    }

    /// Delay every `create_file` before it settles.
    pub fn delay_uploads(&self, delay: Duration) {
        *self.upload_delay.lock().unwrap() = Some(delay);
    }

    pub fn containers(&self) -> Vec<String> {
        self.containers.lock().unwrap().clone()
    }

    pub fn file(&self, container: &str, name: &str) -> Option<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(&(container.to_string(), name.to_string()))
            .cloned()
    }

    /// Names stored in `container`, sorted.
    pub fn file_names(&self, container: &str) -> Vec<String> {
        self.files
            .lock()
            .unwrap()
            .keys()
            .filter(|(c, _)| c == container)
            .map(|(_, n)| n.clone())
            .collect()
    }

    pub fn create_file_calls(&self) -> usize {
        self.create_file_calls.load(Ordering::SeqCst)
    }

    /// `create_file` calls that have finished, successfully or not.
    pub fn settled_uploads(&self) -> usize {
        self.settled.load(Ordering::SeqCst)
    }
}

impl ObjectStorage for RecordingObjectStorage {
    fn create_container<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if *self.fail_containers.lock().unwrap() {
                return Err(ComputeError::Store(format!("container {name} refused")));
            }
            let mut containers = self.containers.lock().unwrap();
            if !containers.iter().any(|c| c == name) {
                containers.push(name.to_string());
            }
            Ok(())
        })
    }

    fn create_file<'a>(
        &'a self,
        container: &'a str,
        name: &'a str,
        mut reader: ArtifactReader,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.create_file_calls.fetch_add(1, Ordering::SeqCst);

            let delay = *self.upload_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let result = async {
                if self.failing_files.lock().unwrap().contains(name) {
                    return Err(ComputeError::Store(format!("upload of {name} refused")));
                }
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes).await?;
                self.files
                    .lock()
                    .unwrap()
                    .insert((container.to_string(), name.to_string()), bytes);
                Ok::<(), ComputeError>(())
            }
            .await;

            self.settled.fetch_add(1, Ordering::SeqCst);
            result
        })
    }
}

/// Process runner that records every invocation and then delegates to the
/// real Tokio runner.
#[derive(Debug)]
pub struct RecordingRunner {
    inner: TokioProcessRunner,
    invocations: Mutex<Vec<Invocation>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self {
            inner: TokioProcessRunner::new(200),
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn spawn_count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

impl Default for RecordingRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner for RecordingRunner {
    fn spawn(&self, label: &str, invocation: &Invocation) -> Result<Box<dyn RunningProcess>> {
        self.invocations.lock().unwrap().push(invocation.clone());
        self.inner.spawn(label, invocation)
    }
}

/// Shared handles to every fake, for building `Collaborators`.
#[derive(Debug, Clone, Default)]
pub struct Fakes {
    pub jobs: Arc<MemoryJobStore>,
    pub algorithms: Arc<MemoryAlgorithmRepository>,
    pub storage: Arc<RecordingObjectStorage>,
    pub runner: Arc<RecordingRunner>,
}

impl Fakes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collaborators(&self) -> eae_compute::executor::Collaborators {
        eae_compute::executor::Collaborators {
            jobs: self.jobs.clone(),
            algorithms: self.algorithms.clone(),
            storage: self.storage.clone(),
            runner: self.runner.clone(),
        }
    }
}
