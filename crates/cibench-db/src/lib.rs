//! Job store for the CI benchmarker.
//!
//! Provides the `JobStore` trait, its SQLite implementation and the
//! retry helper every store write runs through.

pub mod error;
pub mod repo;
pub mod retry;

pub use error::{DbError, DbResult};
pub use repo::*;
pub use retry::{Backoff, RetryError, RetryPolicy};

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

/// Create a connection pool for the database file, creating it if missing.
pub async fn create_pool(
    path: &Path,
    max_connections: u32,
    busy_timeout: Duration,
) -> DbResult<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(busy_timeout)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
