// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{ComputeError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ComputeError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_compute(cfg)?;
    validate_python(cfg)?;
    Ok(())
}

fn validate_compute(cfg: &RawConfigFile) -> Result<()> {
    if cfg.compute.threads == 0 {
        return Err(ComputeError::Config(
            "[compute].threads must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.compute.max_captured_lines == 0 {
        return Err(ComputeError::Config(
            "[compute].max_captured_lines must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.compute.work_dir.as_os_str().is_empty() {
        return Err(ComputeError::Config(
            "[compute].work_dir must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_python(cfg: &RawConfigFile) -> Result<()> {
    let python = &cfg.python;

    if python.interpreter.trim().is_empty() {
        return Err(ComputeError::Config(
            "[python].interpreter must not be empty".to_string(),
        ));
    }

    if python.entry_class.trim().is_empty() {
        return Err(ComputeError::Config(
            "[python].entry_class must not be empty".to_string(),
        ));
    }

    let ext = python.extension.as_str();
    if ext.is_empty() || ext.starts_with('.') || ext.contains('/') || ext.contains('\\') {
        return Err(ComputeError::Config(format!(
            "[python].extension must be a bare extension like \"py\" (got {:?})",
            ext
        )));
    }

    Ok(())
}
