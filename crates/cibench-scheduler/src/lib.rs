//! Benchmark batch dispatch for the CI benchmarker.
//!
//! Fans a batch of identical jobs out to an executor, records each accepted
//! submission, and records the start/end callbacks reported back by the CI
//! backend.

pub mod orchestrator;
pub mod recorder;

pub use orchestrator::{BatchState, BenchmarkOrchestrator, DispatchReport, DispatchRequest};
pub use recorder::{CompletionRecorder, RecordError};
