// tests/uploads.rs
#![cfg(unix)]

mod common;
use crate::common::{JobBuilder, TestNode, TestResult, init_tracing, scripts, with_timeout};

use std::time::Duration;

use eae_compute::errors::ComputeError;
use eae_compute::executor::{ExecutorState, JobExecutor, drive_job};
use eae_compute::job::JobStatus;

fn parts_node(job_id: &str, parts: usize) -> TestNode {
    let node = TestNode::with_script(scripts::WRITE_PARTS);
    node.add_job(
        JobBuilder::new(job_id).param(&parts.to_string()).build(),
        b"print(1)",
    );
    node
}

#[tokio::test]
async fn one_failed_upload_fails_the_job() -> TestResult {
    init_tracing();
    let node = parts_node("job-upfail", 4);
    node.fakes.storage.fail_file("part-2.csv");
    let executor = node.executor("job-upfail");

    let result = with_timeout(drive_job(executor.as_ref())).await;

    match result {
        Err(ComputeError::Upload { failures }) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].file, "part-2.csv");
        }
        other => panic!("expected Upload error, got {other:?}"),
    }

    // The other uploads still went through.
    let stored = node.fakes.storage.file_names("job-upfail_output");
    assert_eq!(stored, vec!["part-0.csv", "part-1.csv", "part-3.csv"]);

    let job = node.fakes.jobs.job("job-upfail").expect("job exists");
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.message.unwrap_or_default().contains("part-2.csv"));
    assert_eq!(executor.state(), ExecutorState::CleanedUp);
    assert!(node.leftover_staging().is_empty());
    Ok(())
}

#[tokio::test]
async fn several_failures_are_reported_together() -> TestResult {
    init_tracing();
    let node = parts_node("job-upfail-many", 3);
    node.fakes.storage.fail_file("part-0.csv");
    node.fakes.storage.fail_file("part-2.csv");
    let executor = node.executor("job-upfail-many");

    let result = with_timeout(drive_job(executor.as_ref())).await;

    let failures = match result {
        Err(ComputeError::Upload { failures }) => failures,
        other => panic!("expected Upload error, got {other:?}"),
    };
    let mut failed: Vec<String> = failures.into_iter().map(|f| f.file).collect();
    failed.sort();
    assert_eq!(failed, vec!["part-0.csv", "part-2.csv"]);
    Ok(())
}

#[tokio::test]
async fn every_upload_settles_before_post_execution_resolves() -> TestResult {
    init_tracing();
    let node = parts_node("job-slow", 5);
    node.fakes.storage.fail_file("part-0.csv");
    node.fakes.storage.delay_uploads(Duration::from_millis(200));
    let executor = node.executor("job-slow");

    let result = with_timeout(drive_job(executor.as_ref())).await;

    assert!(matches!(result, Err(ComputeError::Upload { .. })));
    assert_eq!(node.fakes.storage.create_file_calls(), 5);
    assert_eq!(node.fakes.storage.settled_uploads(), 5);
    Ok(())
}

#[tokio::test]
async fn uploads_run_concurrently() -> TestResult {
    init_tracing();
    let node = parts_node("job-fanout", 6);
    node.fakes.storage.delay_uploads(Duration::from_millis(500));
    let executor = node.executor("job-fanout");

    let started = std::time::Instant::now();
    let status = with_timeout(drive_job(executor.as_ref())).await?;

    assert_eq!(status, JobStatus::Completed);
    // Six sequential uploads would take at least three seconds.
    assert!(started.elapsed() < Duration::from_millis(2500));
    Ok(())
}

#[tokio::test]
async fn container_failure_is_an_upload_error() -> TestResult {
    init_tracing();
    let node = TestNode::with_script(scripts::NOOP);
    node.add_job(JobBuilder::new("job-nocontainer").build(), b"print(1)");
    node.fakes.storage.fail_containers();
    let executor = node.executor("job-nocontainer");

    let result = with_timeout(drive_job(executor.as_ref())).await;

    let failures = match result {
        Err(ComputeError::Upload { failures }) => failures,
        other => panic!("expected Upload error, got {other:?}"),
    };
    assert_eq!(failures[0].file, "job-nocontainer_output");
    assert_eq!(node.fakes.storage.create_file_calls(), 0);

    let job = node.fakes.jobs.job("job-nocontainer").expect("job exists");
    assert_eq!(job.status, JobStatus::Failed);
    assert!(node.leftover_staging().is_empty());
    Ok(())
}
