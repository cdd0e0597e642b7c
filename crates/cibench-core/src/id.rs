//! Job identifiers.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

/// Identifier of a dispatched benchmark job.
///
/// Either issued by the CI backend, assigned locally, or derived from a
/// backend reference when the backend does not hand out an id of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(transparent)]
#[display("{_0}")]
pub struct JobId(Uuid);

impl JobId {
    /// Create a new time-ordered JobId (UUIDv7).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Derive a stable id from a backend reference such as a queue item URL.
    ///
    /// Surrounding whitespace and trailing slashes are ignored, so
    /// `http://ci/queue/item/7/` and `http://ci/queue/item/7` map to the same id.
    pub fn derive_from_reference(reference: &str) -> Self {
        let normalized = reference.trim().trim_end_matches('/');
        Self(Uuid::new_v5(&Uuid::NAMESPACE_URL, normalized.as_bytes()))
    }

    /// Parse a caller supplied identifier.
    pub fn parse(value: &str) -> Result<Self, Error> {
        Uuid::parse_str(value.trim())
            .map(Self)
            .map_err(|e| Error::InvalidInput(format!("invalid job id '{}': {}", value, e)))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<JobId> for Uuid {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl std::str::FromStr for JobId {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}
