//! Job lookup.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use cibench_core::JobId;
use cibench_db::{JobRecord, JobStore};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/{id}", get(get_job))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobRecord>, ApiError> {
    let id = JobId::parse(&id)?;
    let record = state.store.get(id).await?;
    Ok(Json(record))
}
