// tests/logging_filter.rs

use eae_compute::cli::LogLevel;
use eae_compute::logging::build_filter;

#[test]
fn cli_level_wins_over_the_environment() {
    let filter = build_filter(Some(LogLevel::Debug), Some("error")).unwrap();

    assert_eq!(filter.to_string(), "debug");
}

#[test]
fn environment_directives_are_used_verbatim() {
    let filter = build_filter(None, Some("eae_compute::exec=trace,warn")).unwrap();

    let rendered = filter.to_string();
    assert!(rendered.contains("eae_compute::exec=trace"));
    assert!(rendered.contains("warn"));
}

#[test]
fn blank_environment_falls_back_to_info() {
    assert_eq!(build_filter(None, Some("  ")).unwrap().to_string(), "info");
    assert_eq!(build_filter(None, None).unwrap().to_string(), "info");
}

#[test]
fn invalid_directives_are_rejected() {
    assert!(build_filter(None, Some("eae_compute=notalevel")).is_err());
}
