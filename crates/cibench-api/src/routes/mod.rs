//! API routes.

pub mod benchmark;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod results;

use crate::AppState;
use crate::error::ApiError;
use axum::Router;
use axum::body::Bytes;
use serde::de::DeserializeOwned;

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/v1", api_router())
        .merge(health::router())
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/benchmark", benchmark::router())
        .nest("/result", results::router())
        .nest("/jobs", jobs::router())
        .nest("/metrics", metrics::router())
}

/// Decode a JSON request body, reporting malformed input as a bad request.
fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid body: {}", e)))
}

/// Treat absent and blank query values alike.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
