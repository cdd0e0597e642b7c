//! Jenkins executor implementation.
//!
//! Jenkins triggers are CSRF protected: a crumb is fetched first and sent as a
//! header on the trigger call. A successful trigger only returns the URL of a
//! queue item, so the job id is derived from that URL.

use async_trait::async_trait;
use cibench_config::JenkinsConfig;
use cibench_core::executor::{Executor, JobPayload};
use cibench_core::{Error, JobId, Result};
use reqwest::header::LOCATION;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use crate::http;

/// Form field carrying the serialized payload for parameterized builds.
pub const PAYLOAD_PARAMETER: &str = "HADES_PAYLOAD_JSON";

/// Connection settings for one Jenkins job.
#[derive(Debug, Clone, Default)]
pub struct JenkinsSettings {
    pub url: String,
    pub user: String,
    pub api_token: String,
    pub job_path: String,
    pub use_parameters: bool,
}

impl From<&JenkinsConfig> for JenkinsSettings {
    fn from(config: &JenkinsConfig) -> Self {
        Self {
            url: config.url.clone().unwrap_or_default(),
            user: config.user.clone().unwrap_or_default(),
            api_token: config.api_token.clone().unwrap_or_default(),
            job_path: config.job_path.clone().unwrap_or_default(),
            use_parameters: config.use_parameters,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CrumbResponse {
    #[serde(default)]
    crumb: String,
    #[serde(default)]
    crumb_request_field: String,
}

/// Header name and value to attach to trigger requests.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Crumb {
    field: String,
    value: String,
}

/// Executor that triggers a Jenkins job.
pub struct JenkinsExecutor {
    client: Client,
    settings: JenkinsSettings,
}

impl JenkinsExecutor {
    pub fn new(client: Client, mut settings: JenkinsSettings) -> Self {
        info!(url = %settings.url, job_path = %settings.job_path, "Creating Jenkins executor");
        settings.url = settings.url.trim().trim_end_matches('/').to_string();
        settings.job_path = settings
            .job_path
            .trim()
            .trim_start_matches('/')
            .trim_end_matches('/')
            .to_string();
        Self { client, settings }
    }

    /// Fail with `NotConfigured` naming every missing setting.
    pub fn check_configured(&self) -> Result<()> {
        let s = &self.settings;
        let missing: Vec<&str> = [
            ("url", s.url.is_empty()),
            ("user", s.user.is_empty()),
            ("api_token", s.api_token.is_empty()),
            ("job_path", s.job_path.is_empty()),
        ]
        .into_iter()
        .filter_map(|(name, empty)| empty.then_some(name))
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::NotConfigured(format!(
                "Jenkins executor needs {}",
                missing.join(", ")
            )))
        }
    }

    fn trigger_endpoint(&self) -> String {
        let action = if self.settings.use_parameters {
            "buildWithParameters"
        } else {
            "build"
        };
        format!("{}/{}/{}", self.settings.url, self.settings.job_path, action)
    }

    /// Fetch a CSRF crumb. `None` when the instance does not issue crumbs.
    async fn fetch_crumb(&self) -> Result<Option<Crumb>> {
        let endpoint = format!("{}/crumbIssuer/api/json", self.settings.url);
        let request = self
            .client
            .get(&endpoint)
            .basic_auth(&self.settings.user, Some(&self.settings.api_token));
        let response = http::send(request, &endpoint).await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("Jenkins crumb issuer not found, continuing without crumb");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::UnexpectedStatus {
                status: status.as_u16(),
                endpoint,
            });
        }

        let body: CrumbResponse = http::read_json(response, &endpoint).await?;
        if body.crumb.is_empty() || body.crumb_request_field.is_empty() {
            return Ok(None);
        }
        Ok(Some(Crumb {
            field: body.crumb_request_field,
            value: body.crumb,
        }))
    }
}

#[async_trait]
impl Executor for JenkinsExecutor {
    fn name(&self) -> &'static str {
        "JenkinsExecutor"
    }

    async fn submit(&self, payload: &JobPayload) -> Result<JobId> {
        self.check_configured()?;

        let crumb = self.fetch_crumb().await?;
        let endpoint = self.trigger_endpoint();
        debug!(endpoint = %endpoint, crumb = crumb.is_some(), "Triggering Jenkins job");

        let mut request = self
            .client
            .post(&endpoint)
            .basic_auth(&self.settings.user, Some(&self.settings.api_token));

        if self.settings.use_parameters {
            let json = payload.to_json_string()?;
            request = request.form(&[(PAYLOAD_PARAMETER, json)]);
        }
        if let Some(crumb) = &crumb {
            request = request.header(crumb.field.as_str(), crumb.value.as_str());
        }

        let response = http::send(request, &endpoint).await?;
        http::ensure_status(
            &response,
            &endpoint,
            &[StatusCode::CREATED, StatusCode::ACCEPTED],
        )?;

        let location = http::required_header(&response, &LOCATION)?;
        let id = JobId::derive_from_reference(&location);
        info!(queue_url = %location, job_id = %id, "Jenkins job queued");
        Ok(id)
    }
}
