//! Core domain types and traits for the CI benchmarker.
//!
//! This crate contains:
//! - Job identifiers and the opaque job payload
//! - The executor trait implemented by each CI backend
//! - Timestamp parsing shared by callbacks and range queries
//! - Latency statistics (summaries and histograms)

pub mod error;
pub mod executor;
pub mod id;
pub mod stats;
pub mod time;

pub use error::{Error, Result};
pub use executor::{Executor, JobPayload};
pub use id::JobId;
