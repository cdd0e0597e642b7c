//! Latency metrics over recorded jobs.
//!
//! Durations are reported in milliseconds.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use cibench_core::stats::{DEFAULT_BINS, Histogram, MAX_BINS, Summary};
use cibench_core::time::parse_optional_timestamp;
use cibench_db::{DurationKind, JobFilter, JobStore};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::non_blank;
use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{metric}", get(summary))
        .route("/{metric}/histogram", get(histogram))
}

#[derive(Debug, Default, Deserialize)]
struct MetricsQuery {
    from: Option<String>,
    to: Option<String>,
    commit_hash: Option<String>,
    bins: Option<String>,
}

impl MetricsQuery {
    fn filter(&self) -> Result<JobFilter, ApiError> {
        Ok(JobFilter {
            from: parse_optional_timestamp(self.from.as_deref())?,
            to: parse_optional_timestamp(self.to.as_deref())?,
            commit_hash: non_blank(self.commit_hash.clone()),
        })
    }

    fn bins(&self) -> Result<usize, ApiError> {
        match self.bins.as_deref().map(str::trim) {
            None | Some("") => Ok(DEFAULT_BINS),
            Some(v) => match v.parse::<usize>() {
                Ok(n) if (1..=MAX_BINS).contains(&n) => Ok(n),
                _ => Err(ApiError::BadRequest(format!(
                    "invalid bins '{}', expected 1 to {}",
                    v, MAX_BINS
                ))),
            },
        }
    }
}

fn parse_metric(metric: &str) -> Result<DurationKind, ApiError> {
    match metric {
        "queue_latency" => Ok(DurationKind::QueueLatency),
        "build_time" => Ok(DurationKind::BuildTime),
        "total_latency" => Ok(DurationKind::TotalLatency),
        other => Err(ApiError::NotFound(format!("unknown metric '{}'", other))),
    }
}

fn no_data() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": "No data found" })),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
struct SummaryResponse {
    metric: String,
    #[serde(flatten)]
    summary: Summary,
}

#[derive(Debug, Serialize)]
struct HistogramResponse {
    metric: String,
    total_jobs: usize,
    #[serde(flatten)]
    histogram: Histogram,
}

async fn summary(
    State(state): State<AppState>,
    Path(metric): Path<String>,
    Query(query): Query<MetricsQuery>,
) -> Result<Response, ApiError> {
    let kind = parse_metric(&metric)?;
    let filter = query.filter()?;

    let durations = state.store.query_summary(kind, &filter).await?;
    let millis: Vec<i64> = durations.iter().map(|d| d.num_milliseconds()).collect();
    let Some(summary) = Summary::from_millis(&millis) else {
        return Ok(no_data());
    };
    Ok(Json(SummaryResponse { metric, summary }).into_response())
}

async fn histogram(
    State(state): State<AppState>,
    Path(metric): Path<String>,
    Query(query): Query<MetricsQuery>,
) -> Result<Response, ApiError> {
    let kind = parse_metric(&metric)?;
    let filter = query.filter()?;
    let bins = query.bins()?;

    let durations = state.store.query_durations(kind, &filter).await?;
    let millis: Vec<i64> = durations.iter().map(|d| d.num_milliseconds()).collect();
    let Some(histogram) = Histogram::from_millis(&millis, bins) else {
        return Ok(no_data());
    };
    Ok(Json(HistogramResponse {
        metric,
        total_jobs: histogram.total(),
        histogram,
    })
    .into_response())
}
