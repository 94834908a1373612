// tests/executor_run.rs
#![cfg(unix)]

mod common;
use crate::common::{
    JobBuilder, TestNode, TestResult, init_tracing, prepare, scripts, with_timeout, write_script,
};

use std::collections::HashSet;

use eae_compute::errors::ComputeError;
use eae_compute::executor::{ExecutorState, JobExecutor, drive_job};
use eae_compute::job::JobStatus;

fn as_set(names: &[String]) -> HashSet<&str> {
    names.iter().map(String::as_str).collect()
}

#[tokio::test]
async fn scenario_job_42_empty_output_completes() -> TestResult {
    init_tracing();
    let node = TestNode::with_script(scripts::NOOP);
    node.add_job(JobBuilder::new("job-42").build(), b"print(1)");
    let executor = node.executor("job-42");

    let status = with_timeout(drive_job(executor.as_ref())).await?;

    assert_eq!(status, JobStatus::Completed);
    let job = node.fakes.jobs.job("job-42").expect("job exists");
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.output.is_empty());
    assert_eq!(job.exit_code, Some(0));
    assert!(job.start_date.is_some());
    assert!(job.end_date.is_some());
    assert_eq!(node.fakes.storage.create_file_calls(), 0);
    assert_eq!(executor.state(), ExecutorState::CleanedUp);
    assert!(node.leftover_staging().is_empty());
    Ok(())
}

#[tokio::test]
async fn scenario_job_43_uploads_both_files() -> TestResult {
    init_tracing();
    let node = TestNode::with_script(
        "printf 'id,value\\n1,2\\n' > \"$5/result.csv\"\nprintf 'done\\n' > \"$5/log.txt\"\n",
    );
    node.add_job(JobBuilder::new("job-43").build(), b"print(1)");
    let executor = node.executor("job-43");

    let status = with_timeout(drive_job(executor.as_ref())).await?;

    assert_eq!(status, JobStatus::Completed);
    let storage = &node.fakes.storage;
    assert_eq!(storage.containers(), vec!["job-43_output".to_string()]);
    assert_eq!(
        storage.file("job-43_output", "result.csv").as_deref(),
        Some(&b"id,value\n1,2\n"[..])
    );
    assert_eq!(
        storage.file("job-43_output", "log.txt").as_deref(),
        Some(&b"done\n"[..])
    );

    let job = node.fakes.jobs.job("job-43").expect("job exists");
    assert_eq!(as_set(&job.output), HashSet::from(["result.csv", "log.txt"]));
    Ok(())
}

#[tokio::test]
async fn uploads_exactly_the_files_produced() -> TestResult {
    init_tracing();
    for n in [0usize, 1, 7] {
        let node = TestNode::with_script(scripts::WRITE_PARTS);
        let id = format!("job-parts-{n}");
        node.add_job(JobBuilder::new(&id).param(&n.to_string()).build(), b"");
        let executor = node.executor(&id);

        let status = with_timeout(drive_job(executor.as_ref())).await?;
        assert_eq!(status, JobStatus::Completed);

        let container = format!("{id}_output");
        let expected: HashSet<String> = (0..n).map(|i| format!("part-{i}.csv")).collect();
        let job = node.fakes.jobs.job(&id).expect("job exists");
        let listed: HashSet<String> = job.output.iter().cloned().collect();
        let stored: HashSet<String> = node.fakes.storage.file_names(&container).into_iter().collect();

        assert_eq!(listed, expected, "output list for n={n}");
        assert_eq!(stored, expected, "stored files for n={n}");
        assert_eq!(job.output.len(), n);
        assert_eq!(node.fakes.storage.create_file_calls(), n);
    }
    Ok(())
}

#[tokio::test]
async fn absent_output_dir_yields_empty_output() -> TestResult {
    init_tracing();
    let node = TestNode::with_script(scripts::REMOVE_OUTPUT);
    node.add_job(
        JobBuilder::new("job-nodir").output(&["stale.csv"]).build(),
        b"print(1)",
    );
    let executor = node.executor("job-nodir");

    let status = with_timeout(drive_job(executor.as_ref())).await?;

    assert_eq!(status, JobStatus::Completed);
    let job = node.fakes.jobs.job("job-nodir").expect("job exists");
    assert!(job.output.is_empty(), "stale output must be reset, got {:?}", job.output);
    assert_eq!(node.fakes.storage.create_file_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn params_with_shell_metacharacters_pass_verbatim() -> TestResult {
    init_tracing();
    let node = TestNode::with_script(scripts::RECORD_ARGS);
    let marker = node.dir.path().join("pwned");
    let params = vec![
        format!("; touch {}", marker.display()),
        format!("$(touch {})", marker.display()),
        format!("`touch {}`", marker.display()),
        "a b  c".to_string(),
        "| cat /etc/passwd".to_string(),
        "'\"quoted\"'".to_string(),
    ];
    let param_refs: Vec<&str> = params.iter().map(String::as_str).collect();
    node.add_job(
        JobBuilder::new("job-args").params(&param_refs).build(),
        b"print(1)",
    );
    let executor = node.executor("job-args");

    let status = with_timeout(drive_job(executor.as_ref())).await?;
    assert_eq!(status, JobStatus::Completed);
    assert!(!marker.exists(), "no secondary command may run");

    let args = node
        .fakes
        .storage
        .file("job-args_output", "args.txt")
        .expect("args.txt uploaded");
    let args = String::from_utf8(args)?;
    let lines: Vec<&str> = args.lines().collect();

    assert_eq!(lines.len(), 5 + params.len());
    assert!(lines[0].ends_with("/input/algo.py"));
    assert_eq!(lines[1], "Algorithm");
    assert!(lines[2].ends_with("/input"));
    assert_eq!(lines[3], "2");
    assert!(lines[4].ends_with("/output"));
    assert_eq!(&lines[5..], param_refs.as_slice());

    let invocations = node.fakes.runner.invocations();
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].program, "sh");
    assert_eq!(invocations[0].args.len(), 6 + params.len());
    Ok(())
}

#[tokio::test]
async fn process_runs_inside_the_input_dir() -> TestResult {
    init_tracing();
    let node = TestNode::with_script(scripts::RECORD_ARGS);
    node.add_job(JobBuilder::new("job-cwd").build(), b"print(1)");
    let executor = node.executor("job-cwd");

    with_timeout(drive_job(executor.as_ref())).await?;

    let cwd = node
        .fakes
        .storage
        .file("job-cwd_output", "cwd.txt")
        .expect("cwd.txt uploaded");
    assert!(String::from_utf8(cwd)?.trim_end().ends_with("/input"));
    Ok(())
}

#[tokio::test]
async fn staged_inputs_are_visible_to_the_process() -> TestResult {
    init_tracing();
    let node = TestNode::with_script(scripts::COPY_INPUTS);
    node.add_job(JobBuilder::new("job-copy").build(), b"print('hello')\n");
    node.fakes
        .jobs
        .add_dataset_file("job-copy", "rows.csv", b"1,2\n");
    let executor = node.executor("job-copy");

    with_timeout(drive_job(executor.as_ref())).await?;

    let storage = &node.fakes.storage;
    assert_eq!(
        storage.file("job-copy_output", "algo_copy").as_deref(),
        Some(&b"print('hello')\n"[..])
    );
    assert_eq!(
        storage.file("job-copy_output", "rows.csv").as_deref(),
        Some(&b"1,2\n"[..])
    );
    let job = node.fakes.jobs.job("job-copy").expect("job exists");
    assert!(job.stdout.unwrap_or_default().contains("copied inputs"));
    Ok(())
}

#[tokio::test]
async fn nonzero_exit_is_a_process_error() -> TestResult {
    init_tracing();
    let node = TestNode::with_script(scripts::FAIL);
    node.add_job(JobBuilder::new("job-fail").build(), b"print(1)");
    let executor = node.executor("job-fail");

    let result = with_timeout(drive_job(executor.as_ref())).await;

    match result {
        Err(ComputeError::Process { exit_code, .. }) => assert_eq!(exit_code, Some(3)),
        other => panic!("expected Process error, got {other:?}"),
    }
    let job = node.fakes.jobs.job("job-fail").expect("job exists");
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.exit_code, Some(3));
    assert!(job.stderr.unwrap_or_default().contains("boom: bad input"));
    assert_eq!(executor.state(), ExecutorState::CleanedUp);
    assert!(node.leftover_staging().is_empty());
    Ok(())
}

#[tokio::test]
async fn running_status_is_persisted_before_the_final_update() -> TestResult {
    init_tracing();
    let node = TestNode::with_script(scripts::NOOP);
    node.add_job(JobBuilder::new("job-status").build(), b"print(1)");
    let executor = node.executor("job-status");

    with_timeout(prepare(executor.as_ref())).await;
    with_timeout(executor.start_execution()).await?;

    let statuses: Vec<Option<JobStatus>> = node
        .fakes
        .jobs
        .updates()
        .into_iter()
        .map(|(_, patch)| patch.status)
        .collect();
    assert_eq!(
        statuses,
        vec![Some(JobStatus::Running), Some(JobStatus::Completed)]
    );
    Ok(())
}

#[tokio::test]
async fn post_execution_after_cleanup_is_rejected() -> TestResult {
    init_tracing();
    let node = TestNode::with_script(scripts::NOOP);
    node.add_job(JobBuilder::new("job-again").build(), b"print(1)");
    let executor = node.executor("job-again");

    with_timeout(drive_job(executor.as_ref())).await?;
    let again = executor.post_execution().await;

    assert!(matches!(again, Err(ComputeError::InvalidState { .. })));
    Ok(())
}

#[tokio::test]
async fn a_rerun_replaces_everything_the_previous_attempt_recorded() -> TestResult {
    init_tracing();
    let node = TestNode::with_script(scripts::FAIL);
    node.add_job(JobBuilder::new("job-rerun").build(), b"print(1)");

    let first = with_timeout(drive_job(node.executor("job-rerun").as_ref())).await;
    assert!(matches!(first, Err(ComputeError::Process { .. })));
    let failed = node.fakes.jobs.job("job-rerun").expect("job exists");
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.exit_code, Some(3));
    assert!(failed.message.is_some());

    write_script(node.dir.path(), "runner.sh", scripts::RECORD_ARGS);
    let status = with_timeout(drive_job(node.executor("job-rerun").as_ref())).await?;
    assert_eq!(status, JobStatus::Completed);

    let done = node.fakes.jobs.job("job-rerun").expect("job exists");
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.message, None);
    assert_eq!(done.exit_code, Some(0));
    assert!(!done.stderr.unwrap_or_default().contains("boom"));
    assert!(done.start_date > failed.start_date);
    assert!(done.end_date > failed.end_date);
    assert_eq!(as_set(&done.output), HashSet::from(["args.txt", "cwd.txt"]));

    // A staging failure never reaches the process, so no run facts remain.
    node.fakes.jobs.fail_materialize();
    let third = with_timeout(drive_job(node.executor("job-rerun").as_ref())).await;
    assert!(matches!(third, Err(ComputeError::Staging(_))));

    let staged = node.fakes.jobs.job("job-rerun").expect("job exists");
    assert_eq!(staged.status, JobStatus::Failed);
    assert_eq!(staged.exit_code, None);
    assert_eq!(staged.stdout, None);
    assert_eq!(staged.start_date, None);
    assert!(staged.output.is_empty());
    assert!(staged.end_date.is_some());
    assert!(staged.message.unwrap_or_default().contains("dataset unavailable"));
    Ok(())
}
