// src/config/mod.rs

//! Configuration loading and validation for the compute node.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate basic invariants like non-zero parallelism (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    ComputeSection, ConfigFile, PythonSection, RawConfigFile, StorageSection, StoreSection,
};
