//! Health check endpoint.

use axum::Json;
use axum::Router;
use axum::routing::get;
use serde_json::{Value, json};

pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(health))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{call, get, sqlite_state};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::TempDir::new().unwrap();
        let (state, _) = sqlite_state(&dir).await;
        let (status, body) = call(state, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }
}
