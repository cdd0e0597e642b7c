//! Benchmark job repository.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use cibench_core::JobId;
use serde::Serialize;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteQueryResult;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::retry::{RetryError, RetryPolicy, retry};
use crate::{DbError, DbResult};

/// A job to insert right after its submission was accepted.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: JobId,
    pub creation_time: DateTime<Utc>,
    pub executor_name: String,
    pub metadata: Option<String>,
    pub commit_hash: Option<String>,
}

/// A benchmark job as stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    pub executor: String,
    pub creation_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub commit_hash: Option<String>,
    pub metadata: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    executor: String,
    creation_time: i64,
    start_time: Option<i64>,
    end_time: Option<i64>,
    commit_hash: Option<String>,
    metadata: Option<String>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = DbError;

    fn try_from(row: JobRow) -> DbResult<Self> {
        let id = JobId::parse(&row.id)
            .map_err(|e| DbError::Corrupt(format!("job id '{}': {}", row.id, e)))?;
        Ok(Self {
            id,
            executor: row.executor,
            creation_time: from_millis(row.creation_time)?,
            start_time: row.start_time.map(from_millis).transpose()?,
            end_time: row.end_time.map(from_millis).transpose()?,
            commit_hash: row.commit_hash,
            metadata: row.metadata,
        })
    }
}

/// Whether a stored row was written for `job`, compared at storage precision.
fn is_same_job(record: &JobRecord, job: &NewJob) -> bool {
    record.id == job.id
        && record.executor == job.executor_name
        && record.creation_time.timestamp_millis() == job.creation_time.timestamp_millis()
        && record.commit_hash == job.commit_hash
        && record.metadata == job.metadata
}

fn from_millis(millis: i64) -> DbResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| DbError::Corrupt(format!("timestamp {} out of range", millis)))
}

/// Which interval of a job's lifecycle to measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationKind {
    /// Creation to start.
    QueueLatency,
    /// Start to end.
    BuildTime,
    /// Creation to end.
    TotalLatency,
}

impl DurationKind {
    /// Columns holding the (from, to) endpoints of the interval.
    fn endpoints(self) -> (&'static str, &'static str) {
        match self {
            DurationKind::QueueLatency => ("creation_time", "start_time"),
            DurationKind::BuildTime => ("start_time", "end_time"),
            DurationKind::TotalLatency => ("creation_time", "end_time"),
        }
    }
}

/// Selects jobs by creation time range and commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub commit_hash: Option<String>,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_scheduled(&self, job: NewJob) -> DbResult<()>;
    async fn update_start(&self, id: JobId, start_time: DateTime<Utc>) -> DbResult<()>;
    async fn update_end(&self, id: JobId, end_time: DateTime<Utc>) -> DbResult<()>;
    async fn get(&self, id: JobId) -> DbResult<JobRecord>;
    /// Durations of matching jobs, ordered by creation time.
    async fn query_durations(
        &self,
        kind: DurationKind,
        filter: &JobFilter,
    ) -> DbResult<Vec<TimeDelta>>;
    /// Durations of matching jobs, sorted ascending.
    async fn query_summary(&self, kind: DurationKind, filter: &JobFilter)
    -> DbResult<Vec<TimeDelta>>;
}

/// Connection and write-retry settings for [`SqliteJobStore::open`].
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub path: PathBuf,
    pub max_connections: u32,
    pub busy_timeout: Duration,
    pub retry: RetryPolicy,
    pub attempt_timeout: Duration,
}

impl StoreSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_connections: 4,
            busy_timeout: Duration::from_secs(1),
            retry: RetryPolicy::default(),
            attempt_timeout: Duration::from_secs(3),
        }
    }
}

/// SQLite implementation of JobStore.
pub struct SqliteJobStore {
    pool: SqlitePool,
    retry: RetryPolicy,
    attempt_timeout: Duration,
}

impl SqliteJobStore {
    /// Open (creating if missing) the database file and run migrations.
    pub async fn open(settings: StoreSettings) -> DbResult<Self> {
        info!(path = %settings.path.display(), "Opening job store");
        let pool = crate::create_pool(
            &settings.path,
            settings.max_connections,
            settings.busy_timeout,
        )
        .await?;
        crate::run_migrations(&pool).await?;
        Ok(Self::new(pool, settings.retry, settings.attempt_timeout))
    }

    pub fn new(pool: SqlitePool, retry: RetryPolicy, attempt_timeout: Duration) -> Self {
        Self {
            pool,
            retry,
            attempt_timeout,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run a write under the retry policy, each attempt bounded by the attempt timeout.
    async fn execute_write<F, Fut>(&self, op: F) -> DbResult<u64>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<SqliteQueryResult, sqlx::Error>>,
    {
        self.execute_write_tracked(op).await.0
    }

    /// Like [`Self::execute_write`], also reporting whether any attempt timed out.
    ///
    /// A timed-out statement may still commit after its future is dropped.
    async fn execute_write_tracked<F, Fut>(&self, op: F) -> (DbResult<u64>, bool)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<SqliteQueryResult, sqlx::Error>>,
    {
        let attempt_timeout = self.attempt_timeout;
        let timed_out = AtomicBool::new(false);
        let flag = &timed_out;
        let outcome = retry(
            &self.retry,
            |e: &DbError| e.is_transient(),
            |_| {
                let pending = op();
                async move {
                    match tokio::time::timeout(attempt_timeout, pending).await {
                        Ok(Ok(done)) => Ok(done.rows_affected()),
                        Ok(Err(e)) => Err(DbError::from_sqlx(e)),
                        Err(_) => {
                            flag.store(true, Ordering::Relaxed);
                            Err(DbError::Timeout(attempt_timeout))
                        }
                    }
                }
            },
        )
        .await;

        let outcome = outcome.map_err(|e| match e {
            RetryError::Permanent(e) => e,
            RetryError::Exhausted { attempts, last } => DbError::RetryExhausted {
                attempts,
                last: Box::new(last),
            },
        });
        (outcome, timed_out.load(Ordering::Relaxed))
    }

    /// Resolve an insert outcome.
    ///
    /// A duplicate that follows a timed-out attempt is the row that attempt
    /// committed, provided the stored row is this job.
    async fn settle_insert(
        &self,
        job: &NewJob,
        outcome: DbResult<u64>,
        timed_out: bool,
    ) -> DbResult<()> {
        let err = match outcome {
            Ok(_) => return Ok(()),
            Err(e @ DbError::Duplicate(_)) if timed_out => e,
            Err(e) => return Err(e),
        };
        let existing = self.get(job.id).await?;
        if !is_same_job(&existing, job) {
            return Err(err);
        }
        warn!(job_id = %job.id, "Insert committed by a timed-out attempt");
        Ok(())
    }

    async fn update_endpoint(
        &self,
        column: &'static str,
        id: JobId,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        let sql = format!("UPDATE jobs SET {} = ?1 WHERE id = ?2", column);
        let key = id.to_string();
        let (sql, key, pool) = (sql.as_str(), key.as_str(), &self.pool);
        let millis = at.timestamp_millis();

        let updated = self
            .execute_write(move || sqlx::query(sql).bind(millis).bind(key).execute(pool))
            .await?;
        if updated == 0 {
            return Err(DbError::NotFound(format!("job {}", id)));
        }
        debug!(job_id = %id, column, "Job updated");
        Ok(())
    }

    async fn fetch_durations(
        &self,
        kind: DurationKind,
        filter: &JobFilter,
        order_by: &str,
    ) -> DbResult<Vec<TimeDelta>> {
        let (from_col, to_col) = kind.endpoints();
        let sql = format!(
            r#"
            SELECT {to} - {from} AS duration_ms
            FROM jobs
            WHERE {from} IS NOT NULL AND {to} IS NOT NULL
              AND (?1 IS NULL OR creation_time >= ?1)
              AND (?2 IS NULL OR creation_time <= ?2)
              AND (?3 IS NULL OR commit_hash = ?3)
            ORDER BY {order}
            "#,
            from = from_col,
            to = to_col,
            order = order_by,
        );

        let millis: Vec<i64> = sqlx::query_scalar(&sql)
            .bind(filter.from.map(|t| t.timestamp_millis()))
            .bind(filter.to.map(|t| t.timestamp_millis()))
            .bind(filter.commit_hash.as_deref())
            .fetch_all(&self.pool)
            .await?;
        Ok(millis.into_iter().map(TimeDelta::milliseconds).collect())
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create_scheduled(&self, job: NewJob) -> DbResult<()> {
        let key = job.id.to_string();
        let created = job.creation_time.timestamp_millis();
        let (key, executor, pool) = (key.as_str(), job.executor_name.as_str(), &self.pool);
        let (commit_hash, metadata) = (job.commit_hash.as_deref(), job.metadata.as_deref());

        let (outcome, timed_out) = self
            .execute_write_tracked(move || {
                sqlx::query(
                    r#"
                    INSERT INTO jobs (id, executor, creation_time, commit_hash, metadata)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    "#,
                )
                .bind(key)
                .bind(executor)
                .bind(created)
                .bind(commit_hash)
                .bind(metadata)
                .execute(pool)
            })
            .await;
        self.settle_insert(&job, outcome, timed_out).await?;

        debug!(job_id = %job.id, executor = %job.executor_name, "Job scheduled");
        Ok(())
    }

    async fn update_start(&self, id: JobId, start_time: DateTime<Utc>) -> DbResult<()> {
        self.update_endpoint("start_time", id, start_time).await
    }

    async fn update_end(&self, id: JobId, end_time: DateTime<Utc>) -> DbResult<()> {
        self.update_endpoint("end_time", id, end_time).await
    }

    async fn get(&self, id: JobId) -> DbResult<JobRecord> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("job {}", id)))?;
        row.try_into()
    }

    async fn query_durations(
        &self,
        kind: DurationKind,
        filter: &JobFilter,
    ) -> DbResult<Vec<TimeDelta>> {
        self.fetch_durations(kind, filter, "creation_time").await
    }

    async fn query_summary(
        &self,
        kind: DurationKind,
        filter: &JobFilter,
    ) -> DbResult<Vec<TimeDelta>> {
        self.fetch_durations(kind, filter, "duration_ms").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::Backoff;
    use chrono::TimeZone;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn open_store(dir: &TempDir) -> SqliteJobStore {
        SqliteJobStore::open(StoreSettings::new(dir.path().join("jobs.db")))
            .await
            .unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn new_job(created: DateTime<Utc>, commit: Option<&str>) -> NewJob {
        NewJob {
            id: JobId::new(),
            creation_time: created,
            executor_name: "HadesDockerExecutor".to_string(),
            metadata: None,
            commit_hash: commit.map(str::to_string),
        }
    }

    async fn insert_complete(
        store: &SqliteJobStore,
        created: i64,
        started: i64,
        ended: i64,
        commit: Option<&str>,
    ) -> JobId {
        let job = new_job(at(created), commit);
        let id = job.id;
        store.create_scheduled(job).await.unwrap();
        store.update_start(id, at(started)).await.unwrap();
        store.update_end(id, at(ended)).await.unwrap();
        id
    }

    fn secs(deltas: &[TimeDelta]) -> Vec<i64> {
        deltas.iter().map(|d| d.num_seconds()).collect()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let mut job = new_job(at(0), Some("abc123"));
        job.metadata = Some("nightly".to_string());
        let id = job.id;
        store.create_scheduled(job).await.unwrap();

        let record = store.get(id).await.unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.executor, "HadesDockerExecutor");
        assert_eq!(record.creation_time, at(0));
        assert_eq!(record.start_time, None);
        assert_eq!(record.end_time, None);
        assert_eq!(record.commit_hash.as_deref(), Some("abc123"));
        assert_eq!(record.metadata.as_deref(), Some("nightly"));
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let err = store.get(JobId::new()).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let job = new_job(at(0), None);
        store.create_scheduled(job.clone()).await.unwrap();
        let err = store.create_scheduled(job).await.unwrap_err();
        assert!(matches!(err, DbError::Duplicate(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_duplicate_after_timed_out_attempt_is_the_same_insert() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        // the first attempt timed out on the client but its INSERT committed
        let job = new_job(at(0), Some("abc123"));
        store.create_scheduled(job.clone()).await.unwrap();
        let duplicate = || Err(DbError::Duplicate("UNIQUE constraint failed: jobs.id".into()));

        store.settle_insert(&job, duplicate(), true).await.unwrap();

        let err = store.settle_insert(&job, duplicate(), false).await.unwrap_err();
        assert!(matches!(err, DbError::Duplicate(_)), "got {:?}", err);

        let mut other = job.clone();
        other.executor_name = "JenkinsExecutor".to_string();
        let err = store.settle_insert(&other, duplicate(), true).await.unwrap_err();
        assert!(matches!(err, DbError::Duplicate(_)), "got {:?}", err);
    }

    #[test]
    fn test_same_job_compares_at_millisecond_precision() {
        let mut job = new_job(at(0) + TimeDelta::microseconds(1_500), None);
        let record = JobRecord {
            id: job.id,
            executor: job.executor_name.clone(),
            creation_time: at(0) + TimeDelta::milliseconds(1),
            start_time: None,
            end_time: None,
            commit_hash: None,
            metadata: None,
        };
        assert!(is_same_job(&record, &job));

        job.metadata = Some("nightly".to_string());
        assert!(!is_same_job(&record, &job));
    }

    #[tokio::test]
    async fn test_updates_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let job = new_job(at(0), None);
        let id = job.id;
        store.create_scheduled(job).await.unwrap();
        store.update_start(id, at(5)).await.unwrap();
        store.update_start(id, at(7)).await.unwrap();
        store.update_end(id, at(20)).await.unwrap();

        let record = store.get(id).await.unwrap();
        assert_eq!(record.start_time, Some(at(7)));
        assert_eq!(record.end_time, Some(at(20)));
    }

    #[tokio::test]
    async fn test_update_unknown_id_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let id = JobId::new();
        let err = store.update_start(id, at(1)).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
        let err = store.update_end(id, at(2)).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_duration_kinds() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        insert_complete(&store, 0, 10, 70, None).await;

        let filter = JobFilter::default();
        let queue = store
            .query_durations(DurationKind::QueueLatency, &filter)
            .await
            .unwrap();
        let build = store
            .query_durations(DurationKind::BuildTime, &filter)
            .await
            .unwrap();
        let total = store
            .query_durations(DurationKind::TotalLatency, &filter)
            .await
            .unwrap();

        assert_eq!(secs(&queue), vec![10]);
        assert_eq!(secs(&build), vec![60]);
        assert_eq!(secs(&total), vec![70]);
    }

    #[tokio::test]
    async fn test_rows_missing_an_endpoint_are_excluded() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        insert_complete(&store, 0, 10, 30, None).await;

        let started_only = new_job(at(1), None);
        let id = started_only.id;
        store.create_scheduled(started_only).await.unwrap();
        store.update_start(id, at(4)).await.unwrap();
        store.create_scheduled(new_job(at(2), None)).await.unwrap();

        let filter = JobFilter::default();
        let queue = store
            .query_durations(DurationKind::QueueLatency, &filter)
            .await
            .unwrap();
        let build = store
            .query_durations(DurationKind::BuildTime, &filter)
            .await
            .unwrap();

        assert_eq!(secs(&queue), vec![10, 3]);
        assert_eq!(secs(&build), vec![20]);
    }

    #[tokio::test]
    async fn test_commit_filter() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        for i in 0..3 {
            insert_complete(&store, i, i + 1, i + 10, Some("c1")).await;
        }
        for i in 0..2 {
            insert_complete(&store, i, i + 1, i + 10, Some("c2")).await;
        }

        let filter = JobFilter {
            commit_hash: Some("c1".to_string()),
            ..Default::default()
        };
        let build = store
            .query_durations(DurationKind::BuildTime, &filter)
            .await
            .unwrap();
        assert_eq!(build.len(), 3);

        let all = store
            .query_durations(DurationKind::BuildTime, &JobFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn test_range_bounds_are_inclusive() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        for created in [0, 100, 200, 300] {
            insert_complete(&store, created, created + 1, created + 2, None).await;
        }

        let filter = JobFilter {
            from: Some(at(100)),
            to: Some(at(200)),
            commit_hash: None,
        };
        let total = store
            .query_durations(DurationKind::TotalLatency, &filter)
            .await
            .unwrap();
        assert_eq!(total.len(), 2);

        let open_ended = JobFilter {
            from: Some(at(150)),
            ..Default::default()
        };
        let total = store
            .query_durations(DurationKind::TotalLatency, &open_ended)
            .await
            .unwrap();
        assert_eq!(total.len(), 2);
    }

    #[tokio::test]
    async fn test_summary_is_sorted_ascending() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        insert_complete(&store, 0, 0, 50, None).await;
        insert_complete(&store, 1, 1, 11, None).await;
        insert_complete(&store, 2, 2, 32, None).await;

        let ordered = store
            .query_durations(DurationKind::BuildTime, &JobFilter::default())
            .await
            .unwrap();
        assert_eq!(secs(&ordered), vec![50, 10, 30]);

        let sorted = store
            .query_summary(DurationKind::BuildTime, &JobFilter::default())
            .await
            .unwrap();
        assert_eq!(secs(&sorted), vec![10, 30, 50]);
    }

    #[tokio::test]
    async fn test_clock_skew_yields_negative_duration() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        insert_complete(&store, 10, 5, 20, None).await;

        let queue = store
            .query_durations(DurationKind::QueueLatency, &JobFilter::default())
            .await
            .unwrap();
        assert_eq!(secs(&queue), vec![-5]);
    }

    #[tokio::test]
    async fn test_concurrent_creates_all_land() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(open_store(&dir).await);

        let writes = (0..20).map(|i| {
            let store = store.clone();
            async move { store.create_scheduled(new_job(at(i), None)).await }
        });
        let results = futures::future::join_all(writes).await;
        assert!(results.iter().all(Result::is_ok));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 20);
    }

    #[tokio::test]
    async fn test_contention_exhausts_retries_then_recovers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.db");
        let store = SqliteJobStore::open(StoreSettings {
            path: path.clone(),
            max_connections: 1,
            busy_timeout: Duration::from_millis(20),
            retry: RetryPolicy {
                max_attempts: 2,
                backoff: Backoff::Fixed(Duration::from_millis(5)),
            },
            attempt_timeout: Duration::from_secs(2),
        })
        .await
        .unwrap();

        let blocker = crate::create_pool(&path, 1, Duration::from_millis(20))
            .await
            .unwrap();
        let mut conn = blocker.acquire().await.unwrap();
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .unwrap();

        let job = new_job(at(0), None);
        let err = store.create_scheduled(job.clone()).await.unwrap_err();
        assert!(
            matches!(err, DbError::RetryExhausted { attempts: 2, .. }),
            "got {:?}",
            err
        );

        sqlx::query("COMMIT").execute(&mut *conn).await.unwrap();
        store.create_scheduled(job.clone()).await.unwrap();
        assert_eq!(store.get(job.id).await.unwrap().id, job.id);
    }
}
