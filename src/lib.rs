// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod executor;
pub mod job;
pub mod logging;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::load_and_validate;
use crate::config::model::ConfigFile;
use crate::engine::{Runtime, RuntimeEvent, RuntimeOptions};
use crate::exec::TokioProcessRunner;
use crate::executor::{Collaborators, ExecutorFactory, ScriptSettings, StagingArea};
use crate::store::{LocalAlgorithmRepository, LocalJobStore, LocalObjectStorage};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - local job store, algorithm repository and object storage
/// - executor factory and runtime
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;

    if args.dry_run {
        print_dry_run(&cfg, &args.job);
        return Ok(());
    }

    let collab = local_collaborators(&cfg);
    let factory = ExecutorFactory::new(ScriptSettings::from_config(&cfg), collab);

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    // Ctrl-C → stop every running job, then exit.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    info!(jobs = ?args.job, "seeding start requests");
    for job_id in &args.job {
        rt_tx
            .send(RuntimeEvent::StartJob {
                job_id: job_id.clone(),
            })
            .await?;
    }

    let options = RuntimeOptions {
        exit_when_idle: true,
        stop_timeout: stop_timeout(&cfg),
    };

    let runtime = Runtime::new(factory, rt_rx, rt_tx, options);
    let summary = runtime.run().await?;

    for report in &summary.reports {
        match &report.result {
            Ok(status) => println!("{}: {status}", report.job_id),
            Err(e) => println!("{}: error: {e}", report.job_id),
        }
    }

    if !summary.all_completed() {
        bail!("not every job completed");
    }
    Ok(())
}

/// Collaborators backed by the local filesystem, as configured.
pub fn local_collaborators(cfg: &ConfigFile) -> Collaborators {
    Collaborators {
        jobs: Arc::new(LocalJobStore::new(
            &cfg.store.jobs_dir,
            &cfg.store.datasets_dir,
        )),
        algorithms: Arc::new(LocalAlgorithmRepository::new(
            &cfg.store.algorithms_dir,
            &cfg.python.extension,
        )),
        storage: Arc::new(LocalObjectStorage::new(&cfg.storage.root)),
        runner: Arc::new(TokioProcessRunner::new(cfg.compute.max_captured_lines)),
    }
}

fn stop_timeout(cfg: &ConfigFile) -> Option<Duration> {
    match cfg.compute.stop_timeout_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    }
}

/// Simple dry-run output: print the effective config and the invocation each
/// job would get, without touching any store.
fn print_dry_run(cfg: &ConfigFile, jobs: &[String]) {
    let settings = ScriptSettings::from_config(cfg);

    println!("eae-compute dry-run");
    println!("  compute.work_dir = {}", cfg.compute.work_dir.display());
    println!("  compute.threads = {}", cfg.compute.threads);
    println!(
        "  compute.max_captured_lines = {}",
        cfg.compute.max_captured_lines
    );
    println!(
        "  compute.stop_timeout_secs = {}",
        cfg.compute.stop_timeout_secs
    );
    println!("  python.interpreter = {}", cfg.python.interpreter);
    println!(
        "  python.runner_script = {}",
        cfg.python.runner_script.display()
    );
    println!("  python.entry_class = {}", cfg.python.entry_class);
    println!("  store.jobs_dir = {}", cfg.store.jobs_dir.display());
    println!(
        "  store.algorithms_dir = {}",
        cfg.store.algorithms_dir.display()
    );
    println!("  store.datasets_dir = {}", cfg.store.datasets_dir.display());
    println!("  storage.root = {}", cfg.storage.root.display());
    println!();

    println!("jobs ({}):", jobs.len());
    for job_id in jobs {
        let staging = StagingArea::at(settings.work_dir.join(format!("{job_id}-<unique>")));
        println!("  - {job_id}");
        println!("      invocation: {}", settings.invocation(&staging, &[]));
    }

    debug!("dry-run complete (no execution)");
}
