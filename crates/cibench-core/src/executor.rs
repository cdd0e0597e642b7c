//! Executor trait and job payload.
//!
//! Executors hand a benchmark job to a CI backend and return the identifier
//! the backend will later report completion under.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{JobId, Result};

/// Opaque job specification forwarded to the backend as-is.
///
/// Pipeline steps, container images and parameters live in here; nothing in
/// the benchmarker interprets them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobPayload(Value);

impl JobPayload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_json(&self) -> &Value {
        &self.0
    }

    /// Serialize the payload for backends that take it as a string parameter.
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(&self.0)
            .map_err(|e| crate::Error::InvalidInput(format!("payload is not serializable: {}", e)))
    }
}

impl Default for JobPayload {
    fn default() -> Self {
        Self(Value::Object(Default::default()))
    }
}

impl From<Value> for JobPayload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Trait for CI backends that accept benchmark jobs.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Name recorded alongside every job this executor submits.
    fn name(&self) -> &'static str;

    /// Submit one job. On error no identifier exists and nothing may be stored.
    async fn submit(&self, payload: &JobPayload) -> Result<JobId>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_serializes_transparently() {
        let payload = JobPayload::new(json!({"steps": [{"image": "alpine"}]}));
        let text = payload.to_json_string().unwrap();
        assert_eq!(text, r#"{"steps":[{"image":"alpine"}]}"#);
    }

    #[test]
    fn test_default_payload_is_empty_object() {
        assert_eq!(JobPayload::default().as_json(), &json!({}));
    }
}
