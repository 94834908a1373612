#![allow(dead_code)]

pub use eae_compute_test_utils::builders::{
    ConfigFileBuilder, JobBuilder, TestNode, scripts, write_script,
};
pub use eae_compute_test_utils::fakes::Fakes;
pub use eae_compute_test_utils::{init_tracing, with_timeout};

use eae_compute::executor::JobExecutor;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// `fetch_model` + `pre_execution`, failing the test on either error.
pub async fn prepare(executor: &dyn JobExecutor) {
    executor.fetch_model().await.expect("fetch_model");
    executor.pre_execution().await.expect("pre_execution");
}
