// tests/cli_args.rs

use std::path::PathBuf;

use clap::Parser;
use eae_compute::cli::CliArgs;

#[test]
fn jobs_are_repeatable() {
    let args = CliArgs::try_parse_from([
        "eae-compute",
        "--config",
        "node.toml",
        "--job",
        "job-42",
        "--job",
        "job-43",
        "--dry-run",
    ])
    .unwrap();

    assert_eq!(args.config, PathBuf::from("node.toml"));
    assert_eq!(args.job, vec!["job-42", "job-43"]);
    assert!(args.dry_run);
    assert!(args.log_level.is_none());
}

#[test]
fn at_least_one_job_is_required() {
    assert!(CliArgs::try_parse_from(["eae-compute"]).is_err());
}

#[test]
fn unknown_log_levels_are_rejected() {
    assert!(CliArgs::try_parse_from(["eae-compute", "--job", "j", "--log-level", "loud"]).is_err());
}
