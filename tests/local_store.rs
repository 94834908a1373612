// tests/local_store.rs

mod common;
use crate::common::{JobBuilder, TestResult, init_tracing};

use eae_compute::errors::ComputeError;
use eae_compute::job::{JobPatch, JobStatus};
use eae_compute::store::{
    AlgorithmRepository, JobStore, LocalAlgorithmRepository, LocalJobStore, LocalObjectStorage,
    ObjectStorage, output_container_name,
};

#[tokio::test]
async fn job_documents_round_trip_through_updates() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let jobs_dir = dir.path().join("jobs");
    std::fs::create_dir_all(&jobs_dir)?;
    std::fs::write(
        jobs_dir.join("job-7.json"),
        r#"{ "id": "job-7", "type": "python", "params": ["--rows", "10"], "status": "queued" }"#,
    )?;
    let store = LocalJobStore::new(&jobs_dir, dir.path().join("datasets"));

    let job = store.get("job-7").await?;
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.params, vec!["--rows", "10"]);
    assert_eq!(job.language, "python");

    store
        .update(
            "job-7",
            JobPatch {
                status: Some(JobStatus::Completed),
                output: Some(vec!["result.csv".to_string()]),
                exit_code: Some(0),
                ..JobPatch::default()
            },
        )
        .await?;

    let job = store.get("job-7").await?;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.output, vec!["result.csv"]);
    assert_eq!(job.exit_code, Some(0));
    assert_eq!(job.params, vec!["--rows", "10"], "untouched fields survive");

    let raw = std::fs::read_to_string(jobs_dir.join("job-7.json"))?;
    assert!(raw.contains("\"exitCode\": 0"));
    assert!(!jobs_dir.join("job-7.json.tmp").exists());
    Ok(())
}

#[tokio::test]
async fn a_new_attempt_patch_clears_the_previous_run() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    std::fs::write(
        dir.path().join("job-8.json"),
        r#"{ "id": "job-8", "status": "failed", "output": ["old.csv"], "exitCode": 3, "message": "boom" }"#,
    )?;
    let store = LocalJobStore::new(dir.path(), dir.path());

    store
        .update(
            "job-8",
            JobPatch {
                new_attempt: true,
                status: Some(JobStatus::Running),
                ..JobPatch::default()
            },
        )
        .await?;

    let job = store.get("job-8").await?;
    assert_eq!(job.status, JobStatus::Running);
    assert!(job.output.is_empty());
    assert_eq!(job.exit_code, None);
    assert_eq!(job.message, None);
    assert_eq!(JobStatus::default(), JobStatus::Created);

    let raw = std::fs::read_to_string(dir.path().join("job-8.json"))?;
    assert!(!raw.contains("exitCode"));
    assert!(!raw.contains("newAttempt"));
    Ok(())
}

#[tokio::test]
async fn unknown_job_is_not_found() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let store = LocalJobStore::new(dir.path(), dir.path());

    assert!(matches!(store.get("nope").await, Err(ComputeError::NotFound(id)) if id == "nope"));
    assert!(matches!(
        store.update("nope", JobPatch::status(JobStatus::Failed)).await,
        Err(ComputeError::NotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn malformed_job_document_is_a_json_error() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("job-bad.json"), "{ \"id\": ")?;
    let store = LocalJobStore::new(dir.path(), dir.path());

    assert!(matches!(store.get("job-bad").await, Err(ComputeError::Json(_))));
    Ok(())
}

#[tokio::test]
async fn path_escaping_ids_are_rejected() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let store = LocalJobStore::new(dir.path(), dir.path());
    let objects = LocalObjectStorage::new(dir.path());

    assert!(matches!(store.get("../etc/passwd").await, Err(ComputeError::Store(_))));
    assert!(matches!(objects.create_container("..").await, Err(ComputeError::Store(_))));
    Ok(())
}

#[tokio::test]
async fn datasets_are_copied_recursively() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let datasets = dir.path().join("datasets");
    std::fs::create_dir_all(datasets.join("job-9/nested"))?;
    std::fs::write(datasets.join("job-9/a.csv"), "1\n")?;
    std::fs::write(datasets.join("job-9/nested/b.csv"), "2\n")?;
    let store = LocalJobStore::new(dir.path().join("jobs"), &datasets);

    let input = dir.path().join("input");
    std::fs::create_dir_all(&input)?;
    store.materialize_data("job-9", &input).await?;

    assert_eq!(std::fs::read_to_string(input.join("a.csv"))?, "1\n");
    assert_eq!(std::fs::read_to_string(input.join("nested/b.csv"))?, "2\n");

    // No dataset at all is fine.
    store.materialize_data("job-without-data", &input).await?;
    Ok(())
}

#[tokio::test]
async fn algorithms_are_read_by_job_id() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("job-1.py"), "print(1)\n")?;
    let repo = LocalAlgorithmRepository::new(dir.path(), "py");

    assert_eq!(repo.source_code("job-1").await?, b"print(1)\n");
    assert!(matches!(
        repo.source_code("job-2").await,
        Err(ComputeError::NotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn objects_land_in_their_container() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let storage = LocalObjectStorage::new(dir.path());
    let container = output_container_name("job-43");
    assert_eq!(container, "job-43_output");

    storage.create_container(&container).await?;
    // Creating it again is fine.
    storage.create_container(&container).await?;
    storage
        .create_file(&container, "result.csv", Box::new(&b"a,b\n"[..]))
        .await?;

    let stored = std::fs::read(storage.container_path(&container).join("result.csv"))?;
    assert_eq!(stored, b"a,b\n");
    Ok(())
}

#[tokio::test]
async fn job_builder_documents_serialise_with_camel_case() -> TestResult {
    let job = JobBuilder::new("job-5").params(&["x"]).status(JobStatus::Running).build();

    let json = serde_json::to_value(&job)?;

    assert_eq!(json["type"], "python");
    assert_eq!(json["status"], "running");
    assert!(json.get("exitCode").is_none());
    Ok(())
}
