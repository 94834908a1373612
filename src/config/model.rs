// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [compute]
/// work_dir = "/tmp/eae-compute"
/// threads = 4
///
/// [python]
/// interpreter = "python3"
/// runner_script = "scripts/run_algorithm.py"
///
/// [store]
/// jobs_dir = "data/jobs"
///
/// [storage]
/// root = "data/objects"
/// ```
///
/// All sections are optional and have reasonable defaults. This raw form is
/// not validated; convert it with `ConfigFile::try_from`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub compute: ComputeSection,

    #[serde(default)]
    pub python: PythonSection,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub storage: StorageSection,
}

/// Validated configuration. Only obtainable through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub compute: ComputeSection,
    pub python: PythonSection,
    pub store: StoreSection,
    pub storage: StorageSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            compute: raw.compute,
            python: raw.python,
            store: raw.store,
            storage: raw.storage,
        }
    }
}

/// `[compute]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ComputeSection {
    /// Parent directory for per-job staging directories.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Parallelism hint passed to the algorithm runner.
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Lines of stdout/stderr kept per stream for the job document.
    #[serde(default = "default_max_captured_lines")]
    pub max_captured_lines: usize,

    /// Bound on waiting for a stop to be confirmed; `0` waits forever.
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("eae-compute")
}

fn default_threads() -> usize {
    4
}

fn default_max_captured_lines() -> usize {
    200
}

fn default_stop_timeout_secs() -> u64 {
    30
}

impl Default for ComputeSection {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            threads: default_threads(),
            max_captured_lines: default_max_captured_lines(),
            stop_timeout_secs: default_stop_timeout_secs(),
        }
    }
}

/// `[python]` section: how script jobs are invoked.
#[derive(Debug, Clone, Deserialize)]
pub struct PythonSection {
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Runner that imports the algorithm module and calls the entry class.
    #[serde(default = "default_runner_script")]
    pub runner_script: PathBuf,

    #[serde(default = "default_entry_class")]
    pub entry_class: String,

    /// Extension of the staged algorithm file (`algo.<extension>`).
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_runner_script() -> PathBuf {
    PathBuf::from("scripts/run_algorithm.py")
}

fn default_entry_class() -> String {
    "Algorithm".to_string()
}

fn default_extension() -> String {
    "py".to_string()
}

impl Default for PythonSection {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            runner_script: default_runner_script(),
            entry_class: default_entry_class(),
            extension: default_extension(),
        }
    }
}

/// `[store]` section: local job store and algorithm repository.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_jobs_dir")]
    pub jobs_dir: PathBuf,

    #[serde(default = "default_algorithms_dir")]
    pub algorithms_dir: PathBuf,

    #[serde(default = "default_datasets_dir")]
    pub datasets_dir: PathBuf,
}

fn default_jobs_dir() -> PathBuf {
    PathBuf::from("data/jobs")
}

fn default_algorithms_dir() -> PathBuf {
    PathBuf::from("data/algorithms")
}

fn default_datasets_dir() -> PathBuf {
    PathBuf::from("data/datasets")
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            jobs_dir: default_jobs_dir(),
            algorithms_dir: default_algorithms_dir(),
            datasets_dir: default_datasets_dir(),
        }
    }
}

/// `[storage]` section: local object storage.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data/objects")
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}
