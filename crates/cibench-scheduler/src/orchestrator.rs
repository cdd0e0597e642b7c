//! Benchmark orchestrator - fans a batch of jobs out to one executor.

use chrono::Utc;
use cibench_core::executor::{Executor, JobPayload};
use cibench_db::{JobStore, NewJob};
use derive_more::Display;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Lifecycle of a dispatch batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BatchState {
    Received,
    Dispatching,
    Joined,
}

/// A batch of identical jobs to dispatch.
#[derive(Debug, Clone, Default)]
pub struct DispatchRequest {
    pub count: usize,
    pub payload: JobPayload,
    pub commit_hash: Option<String>,
    pub metadata: Option<String>,
}

/// Per-batch tallies.
///
/// `submitted` counts accepted submissions, `stored` the subset whose record
/// was written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub requested: usize,
    pub submitted: usize,
    pub stored: usize,
    pub submit_failures: usize,
    pub store_failures: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitOutcome {
    Stored,
    SubmitFailed,
    StoreFailed,
}

/// Everything a dispatch unit needs, shared across the batch.
struct BatchContext {
    batch_id: Uuid,
    executor: Arc<dyn Executor>,
    store: Arc<dyn JobStore>,
    payload: JobPayload,
    commit_hash: Option<String>,
    metadata: Option<String>,
}

impl BatchContext {
    async fn run_unit(&self, unit: usize) -> UnitOutcome {
        let id = match self.executor.submit(&self.payload).await {
            Ok(id) => id,
            Err(e) => {
                error!(
                    batch_id = %self.batch_id,
                    unit,
                    executor = self.executor.name(),
                    error = %e,
                    "Job submission failed"
                );
                return UnitOutcome::SubmitFailed;
            }
        };

        let job = NewJob {
            id,
            creation_time: Utc::now(),
            executor_name: self.executor.name().to_string(),
            metadata: self.metadata.clone(),
            commit_hash: self.commit_hash.clone(),
        };

        match self.store.create_scheduled(job).await {
            Ok(()) => {
                debug!(batch_id = %self.batch_id, unit, job_id = %id, "Job recorded");
                UnitOutcome::Stored
            }
            Err(e) => {
                error!(
                    batch_id = %self.batch_id,
                    unit,
                    job_id = %id,
                    error = %e,
                    "Failed to record scheduled job"
                );
                UnitOutcome::StoreFailed
            }
        }
    }
}

/// Dispatches benchmark batches and records every accepted submission.
pub struct BenchmarkOrchestrator {
    executor: Arc<dyn Executor>,
    store: Arc<dyn JobStore>,
}

impl BenchmarkOrchestrator {
    pub fn new(executor: Arc<dyn Executor>, store: Arc<dyn JobStore>) -> Self {
        Self { executor, store }
    }

    pub fn executor_name(&self) -> &'static str {
        self.executor.name()
    }

    /// Submit `request.count` jobs concurrently and wait for all of them.
    ///
    /// Failures are per unit: a failed submission or store write is logged and
    /// counted without affecting its siblings. Returns once every unit has
    /// finished.
    pub async fn dispatch(&self, request: DispatchRequest) -> DispatchReport {
        let batch_id = Uuid::new_v4();
        let mut report = DispatchReport {
            requested: request.count,
            ..Default::default()
        };
        info!(
            %batch_id,
            state = %BatchState::Received,
            count = request.count,
            executor = self.executor.name(),
            commit_hash = ?request.commit_hash,
            "Benchmark batch received"
        );

        if request.count == 0 {
            info!(%batch_id, state = %BatchState::Joined, "Empty batch, nothing to dispatch");
            return report;
        }

        let context = Arc::new(BatchContext {
            batch_id,
            executor: self.executor.clone(),
            store: self.store.clone(),
            payload: request.payload,
            commit_hash: request.commit_hash,
            metadata: request.metadata,
        });

        info!(%batch_id, state = %BatchState::Dispatching, "Dispatching batch");
        let mut units = JoinSet::new();
        for unit in 0..request.count {
            let context = context.clone();
            units.spawn(async move { context.run_unit(unit).await });
        }

        while let Some(joined) = units.join_next().await {
            match joined {
                Ok(UnitOutcome::Stored) => {
                    report.submitted += 1;
                    report.stored += 1;
                }
                Ok(UnitOutcome::StoreFailed) => {
                    report.submitted += 1;
                    report.store_failures += 1;
                }
                Ok(UnitOutcome::SubmitFailed) => report.submit_failures += 1,
                Err(e) => {
                    error!(%batch_id, error = %e, "Dispatch unit aborted");
                    report.submit_failures += 1;
                }
            }
        }

        info!(
            %batch_id,
            state = %BatchState::Joined,
            submitted = report.submitted,
            stored = report.stored,
            submit_failures = report.submit_failures,
            store_failures = report.store_failures,
            "Benchmark batch joined"
        );
        report
    }
}
