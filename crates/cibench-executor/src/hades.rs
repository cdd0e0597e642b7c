//! Hades executor implementation.
//!
//! Hades is a job queue: one POST schedules the job and the response carries
//! the id Hades will report the result under.

use async_trait::async_trait;
use cibench_config::HadesConfig;
use cibench_core::executor::{Executor, JobPayload};
use cibench_core::{Error, JobId, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::http;

/// Container backend Hades runs the job on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HadesBackend {
    Docker,
    Kubernetes,
}

impl HadesBackend {
    /// Parse a configured backend, falling back to Docker for unknown values.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "docker" => HadesBackend::Docker,
            "kubernetes" | "k8s" => HadesBackend::Kubernetes,
            other => {
                warn!(backend = other, "Invalid Hades backend, defaulting to Docker");
                HadesBackend::Docker
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScheduleResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    job_id: Option<String>,
}

/// Executor for the Hades job queue.
pub struct HadesExecutor {
    client: Client,
    url: String,
    backend: HadesBackend,
}

impl HadesExecutor {
    pub fn new(client: Client, url: impl Into<String>, backend: HadesBackend) -> Self {
        info!(backend = ?backend, "Creating Hades executor");
        Self {
            client,
            url: url.into(),
            backend,
        }
    }

    pub fn from_config(client: Client, config: &HadesConfig) -> Self {
        Self::new(client, config.url.clone(), HadesBackend::parse(&config.backend))
    }
}

#[async_trait]
impl Executor for HadesExecutor {
    fn name(&self) -> &'static str {
        match self.backend {
            HadesBackend::Docker => "HadesDockerExecutor",
            HadesBackend::Kubernetes => "HadesKubernetesExecutor",
        }
    }

    async fn submit(&self, payload: &JobPayload) -> Result<JobId> {
        debug!(url = %self.url, "Submitting job to Hades");

        let request = self.client.post(&self.url).json(payload.as_json());
        let response = http::send(request, &self.url).await?;
        http::ensure_status(&response, &self.url, &[StatusCode::OK])?;

        let body: ScheduleResponse = http::read_json(response, &self.url).await?;
        debug!(message = ?body.message, job_id = ?body.job_id, "Hades response");

        let raw_id = http::required_field(body.job_id, "job_id")?;
        let uuid = Uuid::parse_str(raw_id.trim()).map_err(|e| {
            Error::InvalidResponse(format!("job_id '{}' is not a UUID: {}", raw_id, e))
        })?;

        let id = JobId::from_uuid(uuid);
        info!(job_id = %id, "Hades job scheduled");
        Ok(id)
    }
}
