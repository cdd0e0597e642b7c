//! Records the start and end callbacks a CI backend reports for a job.

use chrono::{DateTime, Utc};
use cibench_core::{Error, JobId, time};
use cibench_db::{DbError, JobStore};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] DbError),
}

impl From<Error> for RecordError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidInput(message) => RecordError::InvalidInput(message),
            other => RecordError::InvalidInput(other.to_string()),
        }
    }
}

pub type RecordResult<T> = std::result::Result<T, RecordError>;

#[derive(Debug, Clone, Copy)]
enum Endpoint {
    Start,
    End,
}

/// Validates completion callbacks and writes them to the job store.
#[derive(Clone)]
pub struct CompletionRecorder {
    store: Arc<dyn JobStore>,
}

impl CompletionRecorder {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Record when the build started. `at` defaults to now.
    pub async fn record_start(&self, id: &str, at: Option<&str>) -> RecordResult<DateTime<Utc>> {
        self.record(Endpoint::Start, id, at).await
    }

    /// Record when the build finished. `at` defaults to now.
    pub async fn record_end(&self, id: &str, at: Option<&str>) -> RecordResult<DateTime<Utc>> {
        self.record(Endpoint::End, id, at).await
    }

    async fn record(
        &self,
        endpoint: Endpoint,
        id: &str,
        at: Option<&str>,
    ) -> RecordResult<DateTime<Utc>> {
        let id = JobId::parse(id)?;
        let at = time::parse_optional_timestamp(at)?.unwrap_or_else(Utc::now);
        debug!(job_id = %id, ?endpoint, %at, "Recording job timestamp");

        match endpoint {
            Endpoint::Start => self.store.update_start(id, at).await?,
            Endpoint::End => self.store.update_end(id, at).await?,
        }

        info!(job_id = %id, ?endpoint, "Job timestamp recorded");
        Ok(at)
    }
}
