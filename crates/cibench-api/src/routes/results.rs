//! Completion callbacks reported by the CI backends.

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

use super::parse_json;
use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/start", post(record_start))
        .route("/end", post(record_end))
}

#[derive(Debug, Deserialize)]
struct TimestampReport {
    uuid: String,
    #[serde(default)]
    time: Option<String>,
}

async fn record_start(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let report: TimestampReport = parse_json(&body)?;
    state
        .recorder
        .record_start(&report.uuid, report.time.as_deref())
        .await?;
    Ok(Json(json!({ "message": "Start time recorded" })))
}

async fn record_end(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let report: TimestampReport = parse_json(&body)?;
    state
        .recorder
        .record_end(&report.uuid, report.time.as_deref())
        .await?;
    Ok(Json(json!({ "message": "Result received" })))
}
