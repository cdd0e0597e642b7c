//! Error types for job submission and input validation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("executor not configured: {0}")]
    NotConfigured(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("unexpected status {status} from {endpoint}")]
    UnexpectedStatus { status: u16, endpoint: String },

    #[error("response missing field: {0}")]
    MissingField(String),

    #[error("response missing header: {0}")]
    MissingHeader(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
