//! Database error types.

use std::time::Duration;
use thiserror::Error;

/// Primary SQLite result codes signalling write contention.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("retry exhausted after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: Box<DbError>,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl DbError {
    /// Convert a driver error, recognising unique key violations.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return DbError::Duplicate(db.message().to_string());
            }
        }
        DbError::Database(err)
    }

    /// Whether retrying the same write may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::Timeout(_) => true,
            DbError::Database(err) => is_contention(err),
            _ => false,
        }
    }
}

/// Busy/locked conditions raised while another writer holds the database.
pub fn is_contention(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => {
            let busy_code = db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
                .unwrap_or(false);
            busy_code || is_locked_message(db.message())
        }
        other => is_locked_message(&other.to_string()),
    }
}

fn is_locked_message(message: &str) -> bool {
    message.contains("database is locked") || message.contains("database table is locked")
}

pub type DbResult<T> = std::result::Result<T, DbError>;
