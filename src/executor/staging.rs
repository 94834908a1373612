// src/executor/staging.rs

//! Per-execution staging directory with `input/` and `output/` subpaths.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::errors::{ComputeError, Result};

static NEXT_SUFFIX: AtomicU64 = AtomicU64::new(0);

const MAX_ALLOCATION_ATTEMPTS: usize = 16;

/// Exclusive working directory for one execution attempt.
///
/// Two attempts never share a directory, even for the same job id: the
/// directory name carries the pid, a timestamp and a process-wide counter,
/// and is created with `create_dir` (which fails if it already exists).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    /// Allocate a fresh staging directory under `work_dir`.
    pub async fn allocate(work_dir: &Path, job_id: &str) -> Result<Self> {
        fs::create_dir_all(work_dir)
            .await
            .with_context(|| format!("creating work dir {:?}", work_dir))
            .map_err(ComputeError::staging)?;

        for _ in 0..MAX_ALLOCATION_ATTEMPTS {
            let root = work_dir.join(unique_name(job_id));
            match fs::create_dir(&root).await {
                Ok(()) => {
                    debug!(job_id, ?root, "staging directory allocated");
                    return Ok(Self { root });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(ComputeError::staging(
                        anyhow::Error::from(e).context(format!("creating staging dir {:?}", root)),
                    ));
                }
            }
        }

        Err(ComputeError::Staging(format!(
            "could not allocate a unique staging dir under {:?}",
            work_dir
        )))
    }

    /// Wrap a path without creating anything on disk.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn input_dir(&self) -> PathBuf {
        self.root.join("input")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    pub async fn create_input_dir(&self) -> Result<PathBuf> {
        create_subdir(self.input_dir()).await
    }

    pub async fn create_output_dir(&self) -> Result<PathBuf> {
        create_subdir(self.output_dir()).await
    }

    /// Write `contents` to `input/<name>` and only return once the data is
    /// on disk.
    ///
    /// The bytes go to a temporary sibling first, are flushed and synced,
    /// then renamed into place, so the final path never holds a partial file.
    pub async fn write_input_file(&self, name: &str, contents: &[u8]) -> Result<PathBuf> {
        let target = self.input_dir().join(name);
        let tmp = self.input_dir().join(format!(".{name}.partial"));

        let written = async {
            let mut file = fs::File::create(&tmp)
                .await
                .with_context(|| format!("creating {:?}", tmp))?;
            file.write_all(contents)
                .await
                .with_context(|| format!("writing {:?}", tmp))?;
            file.flush().await?;
            file.sync_all()
                .await
                .with_context(|| format!("syncing {:?}", tmp))?;
            drop(file);
            fs::rename(&tmp, &target)
                .await
                .with_context(|| format!("moving {:?} into place", tmp))?;
            anyhow::Ok(())
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp).await;
            return Err(ComputeError::staging(e));
        }

        Ok(target)
    }

    /// List the regular files in `output/`.
    ///
    /// Returns `None` if the directory does not exist. Names are sorted.
    pub async fn list_output_files(&self) -> Result<Option<Vec<String>>> {
        let dir = self.output_dir();
        let exists = fs::try_exists(&dir)
            .await
            .with_context(|| format!("checking output dir {:?}", dir))
            .map_err(ComputeError::staging)?;
        if !exists {
            return Ok(None);
        }

        let listed = async {
            let mut names = Vec::new();
            let mut entries = fs::read_dir(&dir)
                .await
                .with_context(|| format!("listing output dir {:?}", dir))?;
            while let Some(entry) = entries.next_entry().await? {
                if !entry.file_type().await?.is_file() {
                    warn!(entry = ?entry.path(), "skipping non-file entry in output dir");
                    continue;
                }
                match entry.file_name().into_string() {
                    Ok(name) => names.push(name),
                    Err(raw) => warn!(name = ?raw, "skipping output file with non UTF-8 name"),
                }
            }
            names.sort();
            anyhow::Ok(names)
        }
        .await;

        listed.map(Some).map_err(ComputeError::staging)
    }

    /// Remove the whole staging tree. Removing an already-missing dir is fine.
    pub async fn remove(&self) -> Result<()> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => {
                debug!(root = ?self.root, "staging directory removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ComputeError::staging(
                anyhow::Error::from(e).context(format!("removing {:?}", self.root)),
            )),
        }
    }
}

fn unique_name(job_id: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let seq = NEXT_SUFFIX.fetch_add(1, Ordering::Relaxed);
    let safe: String = job_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{safe}-{}-{nanos}-{seq}", std::process::id())
}

async fn create_subdir(path: PathBuf) -> Result<PathBuf> {
    fs::create_dir_all(&path)
        .await
        .with_context(|| format!("creating {:?}", path))
        .map_err(ComputeError::staging)?;
    Ok(path)
}
