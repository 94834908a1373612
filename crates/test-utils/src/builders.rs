#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use eae_compute::config::{ConfigFile, RawConfigFile};
use eae_compute::executor::{
    ExecutorFactory, JobExecutor, ScriptJobExecutor, ScriptSettings,
};
use eae_compute::job::{Job, JobStatus};
use tempfile::TempDir;

use crate::fakes::Fakes;

/// Builder for `Job` documents.
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new(id: &str) -> Self {
        Self { job: Job::new(id) }
    }

    pub fn language(mut self, language: &str) -> Self {
        self.job.language = language.to_string();
        self
    }

    pub fn param(mut self, param: &str) -> Self {
        self.job.params.push(param.to_string());
        self
    }

    pub fn params(mut self, params: &[&str]) -> Self {
        self.job.params.extend(params.iter().map(|p| p.to_string()));
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.job.status = status;
        self
    }

    pub fn output(mut self, output: &[&str]) -> Self {
        self.job.output = output.iter().map(|o| o.to_string()).collect();
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.compute.work_dir = dir.into();
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.config.compute.threads = threads;
        self
    }

    pub fn interpreter(mut self, interpreter: &str) -> Self {
        self.config.python.interpreter = interpreter.to_string();
        self
    }

    pub fn runner_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.config.python.runner_script = script.into();
        self
    }

    pub fn entry_class(mut self, entry_class: &str) -> Self {
        self.config.python.entry_class = entry_class.to_string();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Runner scripts executed by `sh`. The executor invokes them as
/// `sh <script> <algo> <entry_class> <input> <threads> <output> [params...]`.
pub mod scripts {
    /// Copy the staged algorithm and the inputs into `output/`.
    pub const COPY_INPUTS: &str = r#"
algo="$1"; input="$3"; out="$5"
cp "$algo" "$out/algo_copy"
for f in "$input"/*; do
  case "$(basename "$f")" in algo.*) ;; *) cp "$f" "$out/" ;; esac
done
echo "copied inputs"
"#;

    /// Write every received argument, one per line, to `output/args.txt`.
    pub const RECORD_ARGS: &str = r#"
out="$5"
for a in "$@"; do printf '%s\n' "$a" >> "$out/args.txt"; done
pwd > "$out/cwd.txt"
"#;

    /// Write `n` files named `part-<i>.csv`; `n` is the first job param.
    pub const WRITE_PARTS: &str = r#"
out="$5"; n="$6"
i=0
while [ "$i" -lt "$n" ]; do
  printf 'row,%s\n' "$i" > "$out/part-$i.csv"
  i=$((i + 1))
done
"#;

    /// Produce nothing and succeed.
    pub const NOOP: &str = "exit 0\n";

    /// Remove the output directory, then succeed.
    pub const REMOVE_OUTPUT: &str = "rmdir \"$5\"\n";

    /// Fail with exit code 3 after a diagnostic on stderr.
    pub const FAIL: &str = "echo 'boom: bad input' >&2\nexit 3\n";

    /// Write a partial result, then block until killed.
    pub const SLEEP: &str = "printf partial > \"$5/partial.txt\"\nexec sleep 30\n";
}

/// Temp-dir backed test node: fakes plus script settings that run a shell
/// runner script instead of Python.
pub struct TestNode {
    pub dir: TempDir,
    pub fakes: Fakes,
    pub settings: ScriptSettings,
}

impl TestNode {
    /// A node whose runner script has the given shell body.
    pub fn with_script(body: &str) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let script = write_script(dir.path(), "runner.sh", body);
        let cfg = ConfigFileBuilder::new()
            .work_dir(dir.path().join("work"))
            .threads(2)
            .interpreter("sh")
            .runner_script(script)
            .build();

        Self {
            dir,
            fakes: Fakes::new(),
            settings: ScriptSettings::from_config(&cfg),
        }
    }

    /// Register a job document and its algorithm source.
    pub fn add_job(&self, job: Job, source: &[u8]) {
        self.fakes.algorithms.insert(&job.id, source);
        self.fakes.jobs.insert(job);
    }

    pub fn executor(&self, job_id: &str) -> Arc<ScriptJobExecutor> {
        Arc::new(ScriptJobExecutor::new(
            job_id,
            self.settings.clone(),
            self.fakes.collaborators(),
        ))
    }

    pub fn dyn_executor(&self, job_id: &str) -> Arc<dyn JobExecutor> {
        self.executor(job_id)
    }

    pub fn factory(&self) -> ExecutorFactory {
        ExecutorFactory::new(self.settings.clone(), self.fakes.collaborators())
    }

    pub fn work_dir(&self) -> &Path {
        &self.settings.work_dir
    }

    /// Entries left under the work dir (staging directories).
    pub fn leftover_staging(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(self.work_dir()) {
            Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("set -e\n{body}")).expect("write runner script");
    path
}
