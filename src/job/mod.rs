// src/job/mod.rs

//! Job documents and the executor's cached working copy.
//!
//! - [`model`] defines the persisted document (`Job`), its status enum and
//!   the partial update type (`JobPatch`).
//! - [`sync`] holds [`JobModel`], the executor-side copy that is kept in
//!   step with the job store whenever status or output change.

pub mod model;
pub mod sync;

pub use model::{Job, JobPatch, JobStatus};
pub use sync::JobModel;
