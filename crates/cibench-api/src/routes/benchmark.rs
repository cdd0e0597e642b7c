//! Benchmark dispatch endpoints.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::routing::post;
use axum::{Json, Router};
use cibench_core::JobPayload;
use cibench_scheduler::{BenchmarkOrchestrator, DispatchRequest};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::{non_blank, parse_json};
use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/hades", post(start_hades))
        .route("/jenkins", post(start_jenkins))
}

#[derive(Debug, Default, Deserialize)]
struct BatchQuery {
    count: Option<String>,
    commit_hash: Option<String>,
    metadata: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct JenkinsQuery {
    count: Option<String>,
    commit_hash: Option<String>,
    metadata: Option<String>,
    host: Option<String>,
    user: Option<String>,
    api_token: Option<String>,
    job_path: Option<String>,
    use_parameters: Option<String>,
}

/// Largest batch a single request may dispatch.
const MAX_BATCH: usize = 10_000;

fn parse_count(value: Option<&str>) -> Result<usize, ApiError> {
    match value.map(str::trim) {
        None | Some("") => Ok(1),
        Some(v) => match v.parse::<usize>() {
            Ok(n) if n <= MAX_BATCH => Ok(n),
            Ok(_) => Err(ApiError::BadRequest(format!(
                "count '{}' exceeds the limit of {}",
                v, MAX_BATCH
            ))),
            Err(_) => Err(ApiError::BadRequest(format!("invalid count '{}'", v))),
        },
    }
}

fn parse_flag(value: &str) -> Result<bool, ApiError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ApiError::BadRequest(format!(
            "invalid use_parameters '{}'",
            other
        ))),
    }
}

/// Validate the query and body into a dispatch request.
fn dispatch_request(query: BatchQuery, body: &Bytes) -> Result<DispatchRequest, ApiError> {
    let count = parse_count(query.count.as_deref())?;
    let payload = if body.iter().all(u8::is_ascii_whitespace) {
        JobPayload::default()
    } else {
        JobPayload::new(parse_json::<Value>(body)?)
    };
    Ok(DispatchRequest {
        count,
        payload,
        commit_hash: non_blank(query.commit_hash),
        metadata: non_blank(query.metadata),
    })
}

async fn run_batch(
    orchestrator: BenchmarkOrchestrator,
    request: DispatchRequest,
) -> Json<Value> {
    let report = orchestrator.dispatch(request).await;
    info!(
        executor = orchestrator.executor_name(),
        requested = report.requested,
        stored = report.stored,
        "Benchmark request completed"
    );
    Json(json!({ "message": "Benchmark started" }))
}

async fn start_hades(
    State(state): State<AppState>,
    Query(query): Query<BatchQuery>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request = dispatch_request(query, &body)?;
    let orchestrator = state
        .hades_orchestrator()
        .ok_or_else(|| ApiError::ServiceUnavailable("Hades is not configured".to_string()))?;
    Ok(run_batch(orchestrator, request).await)
}

async fn start_jenkins(
    State(state): State<AppState>,
    Query(query): Query<JenkinsQuery>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let mut settings = state.jenkins.clone();
    if let Some(host) = non_blank(query.host) {
        settings.url = host;
    }
    if let Some(user) = non_blank(query.user) {
        settings.user = user;
    }
    if let Some(token) = non_blank(query.api_token) {
        settings.api_token = token;
    }
    if let Some(job_path) = non_blank(query.job_path) {
        settings.job_path = job_path;
    }
    if let Some(flag) = non_blank(query.use_parameters) {
        settings.use_parameters = parse_flag(&flag)?;
    }

    let batch = BatchQuery {
        count: query.count,
        commit_hash: query.commit_hash,
        metadata: query.metadata,
    };
    let request = dispatch_request(batch, &body)?;
    let orchestrator = state.jenkins_orchestrator(settings)?;
    Ok(run_batch(orchestrator, request).await)
}
