// tests/runtime_engine.rs
#![cfg(unix)]

mod common;
use crate::common::{JobBuilder, TestNode, TestResult, init_tracing, scripts, with_timeout};

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use eae_compute::engine::{Runtime, RuntimeEvent, RuntimeOptions};
use eae_compute::errors::ComputeError;
use eae_compute::job::JobStatus;

fn once_options() -> RuntimeOptions {
    RuntimeOptions {
        exit_when_idle: true,
        stop_timeout: Some(Duration::from_secs(5)),
    }
}

async fn wait_for_status(node: &TestNode, job_id: &str, status: JobStatus) {
    loop {
        if node.fakes.jobs.job(job_id).map(|j| j.status) == Some(status) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn start_requests_run_jobs_to_completion() -> TestResult {
    init_tracing();
    let node = TestNode::with_script(scripts::WRITE_PARTS);
    node.add_job(JobBuilder::new("job-a").param("1").build(), b"print(1)");
    node.add_job(JobBuilder::new("job-b").param("2").build(), b"print(2)");

    let (tx, rx) = mpsc::channel(16);
    tx.send(RuntimeEvent::StartJob { job_id: "job-a".into() }).await?;
    tx.send(RuntimeEvent::StartJob { job_id: "job-b".into() }).await?;

    let runtime = Runtime::new(node.factory(), rx, tx, once_options());
    let summary = with_timeout(runtime.run()).await?;

    assert_eq!(summary.reports.len(), 2);
    assert!(summary.all_completed(), "{summary:?}");
    assert_eq!(
        node.fakes.jobs.job("job-b").map(|j| j.output.len()),
        Some(2)
    );
    Ok(())
}

#[tokio::test]
async fn unknown_jobs_and_languages_are_reported() -> TestResult {
    init_tracing();
    let node = TestNode::with_script(scripts::NOOP);
    node.add_job(JobBuilder::new("job-r").language("r").build(), b"1");

    let (tx, rx) = mpsc::channel(16);
    tx.send(RuntimeEvent::StartJob { job_id: "job-missing".into() }).await?;
    tx.send(RuntimeEvent::StartJob { job_id: "job-r".into() }).await?;

    let summary = with_timeout(Runtime::new(node.factory(), rx, tx, once_options()).run()).await?;

    let missing = summary.report("job-missing").expect("report");
    assert!(missing.result.as_ref().unwrap_err().contains("not found"));
    let r = summary.report("job-r").expect("report");
    assert!(r.result.as_ref().unwrap_err().contains("Unsupported"));
    assert_eq!(node.fakes.runner.spawn_count(), 0);
    Ok(())
}

#[tokio::test]
async fn a_second_start_for_a_running_job_is_refused() -> TestResult {
    init_tracing();
    let node = TestNode::with_script(scripts::SLEEP);
    node.add_job(JobBuilder::new("job-dup").build(), b"print(1)");

    let (tx, rx) = mpsc::channel(16);
    tx.send(RuntimeEvent::StartJob { job_id: "job-dup".into() }).await?;
    tx.send(RuntimeEvent::StartJob { job_id: "job-dup".into() }).await?;

    let handle = tokio::spawn(Runtime::new(node.factory(), rx, tx.clone(), once_options()).run());

    with_timeout(wait_for_status(&node, "job-dup", JobStatus::Running)).await;
    let (reply_tx, reply_rx) = oneshot::channel();
    tx.send(RuntimeEvent::StopJob {
        job_id: "job-dup".into(),
        reply: Some(reply_tx),
    })
    .await?;
    let outcome = with_timeout(reply_rx).await??;
    assert!(outcome.terminated);

    let summary = with_timeout(handle).await??;
    let refused: Vec<_> = summary
        .reports
        .iter()
        .filter(|r| r.result.as_ref().is_err_and(|e| e.contains("already being executed")))
        .collect();
    assert_eq!(refused.len(), 1);
    assert!(summary
        .reports
        .iter()
        .any(|r| r.result == Ok(JobStatus::Aborted)));
    assert_eq!(node.fakes.runner.spawn_count(), 1);
    Ok(())
}

#[tokio::test]
async fn stopping_an_unknown_job_is_not_found() -> TestResult {
    init_tracing();
    let node = TestNode::with_script(scripts::NOOP);

    let (tx, rx) = mpsc::channel(16);
    let (reply_tx, reply_rx) = oneshot::channel();
    tx.send(RuntimeEvent::StopJob {
        job_id: "ghost".into(),
        reply: Some(reply_tx),
    })
    .await?;

    let summary = with_timeout(Runtime::new(node.factory(), rx, tx, once_options()).run()).await?;

    assert!(summary.reports.is_empty());
    assert!(matches!(reply_rx.await?, Err(ComputeError::NotFound(id)) if id == "ghost"));
    Ok(())
}

#[tokio::test]
async fn shutdown_stops_running_jobs() -> TestResult {
    init_tracing();
    let node = TestNode::with_script(scripts::SLEEP);
    node.add_job(JobBuilder::new("job-long").build(), b"print(1)");

    let (tx, rx) = mpsc::channel(16);
    tx.send(RuntimeEvent::StartJob { job_id: "job-long".into() }).await?;
    let options = RuntimeOptions {
        exit_when_idle: false,
        stop_timeout: None,
    };
    let handle = tokio::spawn(Runtime::new(node.factory(), rx, tx.clone(), options).run());

    with_timeout(wait_for_status(&node, "job-long", JobStatus::Running)).await;
    tx.send(RuntimeEvent::ShutdownRequested).await?;

    let summary = with_timeout(handle).await??;

    assert_eq!(
        summary.report("job-long").map(|r| r.result.clone()),
        Some(Ok(JobStatus::Aborted))
    );
    assert_eq!(node.fakes.runner.spawn_count(), 1);
    assert_eq!(
        node.fakes.jobs.job("job-long").map(|j| j.status),
        Some(JobStatus::Aborted)
    );
    Ok(())
}
