// src/store/local.rs

//! Local-directory implementations of the collaborator traits.
//!
//! Layout:
//! - jobs: `<jobs_dir>/<job_id>.json`
//! - datasets: `<datasets_dir>/<job_id>/...` copied into the staging input
//! - algorithms: `<algorithms_dir>/<job_id>.<ext>`
//! - objects: `<root>/<container>/<file>`

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use futures::future::BoxFuture;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::{ComputeError, Result};
use crate::job::{Job, JobPatch};

use super::{AlgorithmRepository, ArtifactReader, JobStore, ObjectStorage};

/// Reject keys that would escape the backing directory.
fn check_key(kind: &str, key: &str) -> Result<()> {
    if key.is_empty()
        || key == "."
        || key == ".."
        || key.contains('/')
        || key.contains('\\')
    {
        return Err(ComputeError::store(anyhow!("invalid {kind} name {key:?}")));
    }
    Ok(())
}

/// Job store backed by one JSON document per job.
#[derive(Debug)]
pub struct LocalJobStore {
    jobs_dir: PathBuf,
    datasets_dir: PathBuf,
    // Serialises read-modify-write cycles in `update`.
    write_lock: Mutex<()>,
}

impl LocalJobStore {
    pub fn new(jobs_dir: impl Into<PathBuf>, datasets_dir: impl Into<PathBuf>) -> Self {
        Self {
            jobs_dir: jobs_dir.into(),
            datasets_dir: datasets_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn document_path(&self, job_id: &str) -> PathBuf {
        self.jobs_dir.join(format!("{job_id}.json"))
    }

    async fn read_job(&self, job_id: &str) -> Result<Job> {
        check_key("job", job_id)?;
        let path = self.document_path(job_id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ComputeError::NotFound(job_id.to_string()));
            }
            Err(e) => {
                return Err(ComputeError::store(
                    anyhow::Error::from(e).context(format!("reading job document {:?}", path)),
                ));
            }
        };

        serde_json::from_slice(&bytes).map_err(|e| {
            warn!(job_id, ?path, error = %e, "malformed job document");
            ComputeError::Json(e)
        })
    }

    async fn write_job(&self, job: &Job) -> anyhow::Result<()> {
        let path = self.document_path(&job.id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(job)?;

        let mut file = fs::File::create(&tmp)
            .await
            .with_context(|| format!("creating {:?}", tmp))?;
        file.write_all(&body)
            .await
            .with_context(|| format!("writing {:?}", tmp))?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("replacing {:?}", path))?;
        Ok(())
    }
}

impl JobStore for LocalJobStore {
    fn get<'a>(&'a self, job_id: &'a str) -> BoxFuture<'a, Result<Job>> {
        Box::pin(self.read_job(job_id))
    }

    fn materialize_data<'a>(
        &'a self,
        job_id: &'a str,
        input_dir: &'a Path,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            check_key("job", job_id)?;
            let source = self.datasets_dir.join(job_id);
            let exists = fs::try_exists(&source)
                .await
                .with_context(|| format!("checking dataset dir {:?}", source))
                .map_err(ComputeError::store)?;
            if !exists {
                debug!(job_id, ?source, "no dataset directory; nothing to materialise");
                return Ok(());
            }

            let copied = copy_tree(&source, input_dir)
                .await
                .with_context(|| format!("materialising {:?} into {:?}", source, input_dir))
                .map_err(ComputeError::store)?;
            debug!(job_id, copied, "dataset materialised");
            Ok(())
        })
    }

    fn update<'a>(&'a self, job_id: &'a str, patch: JobPatch) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            let mut job = self.read_job(job_id).await?;
            job.apply(&patch);
            self.write_job(&job).await.map_err(ComputeError::store)
        })
    }
}

/// Recursively copy every file under `from` into `to`. Returns the number of
/// files copied.
async fn copy_tree(from: &Path, to: &Path) -> anyhow::Result<usize> {
    let mut copied = 0;
    let mut stack = vec![(from.to_path_buf(), to.to_path_buf())];

    while let Some((src_dir, dst_dir)) = stack.pop() {
        fs::create_dir_all(&dst_dir)
            .await
            .with_context(|| format!("creating dir {:?}", dst_dir))?;

        let mut entries = fs::read_dir(&src_dir)
            .await
            .with_context(|| format!("reading dir {:?}", src_dir))?;
        while let Some(entry) = entries.next_entry().await? {
            let target = dst_dir.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                stack.push((entry.path(), target));
            } else {
                fs::copy(entry.path(), &target)
                    .await
                    .with_context(|| format!("copying {:?}", entry.path()))?;
                copied += 1;
            }
        }
    }

    Ok(copied)
}

/// Algorithm repository reading `<dir>/<job_id>.<extension>`.
#[derive(Debug, Clone)]
pub struct LocalAlgorithmRepository {
    dir: PathBuf,
    extension: String,
}

impl LocalAlgorithmRepository {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }
}

impl AlgorithmRepository for LocalAlgorithmRepository {
    fn source_code<'a>(&'a self, job_id: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            check_key("job", job_id)?;
            let path = self.dir.join(format!("{job_id}.{}", self.extension));
            match fs::read(&path).await {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    Err(ComputeError::NotFound(job_id.to_string()))
                }
                Err(e) => Err(ComputeError::store(
                    anyhow::Error::from(e).context(format!("reading algorithm {:?}", path)),
                )),
            }
        })
    }
}

/// Object storage where each container is a directory under `root`.
#[derive(Debug, Clone)]
pub struct LocalObjectStorage {
    root: PathBuf,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn container_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl ObjectStorage for LocalObjectStorage {
    fn create_container<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            check_key("container", name)?;
            let path = self.container_path(name);
            fs::create_dir_all(&path)
                .await
                .with_context(|| format!("creating container {:?}", path))
                .map_err(ComputeError::store)
        })
    }

    fn create_file<'a>(
        &'a self,
        container: &'a str,
        name: &'a str,
        mut reader: ArtifactReader,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            check_key("container", container)?;
            check_key("file", name)?;
            let path = self.container_path(container).join(name);

            let write = async {
                let mut file = fs::File::create(&path)
                    .await
                    .with_context(|| format!("creating object {:?}", path))?;
                tokio::io::copy(&mut reader, &mut file)
                    .await
                    .with_context(|| format!("writing object {:?}", path))?;
                file.flush().await?;
                file.sync_all().await?;
                anyhow::Ok(())
            };
            write.await.map_err(ComputeError::store)
        })
    }
}
