//! CI backend executors for the CI benchmarker.
//!
//! Provides executor implementations for submitting benchmark jobs:
//! - Hades (queue-style, returns a job id)
//! - Jenkins (trigger-style with CSRF crumbs, id derived from the queue item)

pub mod hades;
pub mod http;
pub mod jenkins;

pub use cibench_core::executor::{Executor, JobPayload};
pub use hades::{HadesBackend, HadesExecutor};
pub use jenkins::{JenkinsExecutor, JenkinsSettings};
