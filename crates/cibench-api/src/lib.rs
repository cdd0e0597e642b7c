//! HTTP server for the CI benchmarker.
//!
//! Starts benchmark batches, receives start/end callbacks from the CI
//! backends and serves latency metrics over the recorded jobs.

pub mod error;
pub mod routes;
pub mod state;

pub use state::AppState;
