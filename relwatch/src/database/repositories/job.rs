//! Job queue persistence.

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::database::models::{JobDbModel, JobKind};
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::now_ms;
use crate::{Error, Result};

#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a pending job. Returns false if its dedupe key is already taken.
    async fn insert(&self, job: &JobDbModel) -> Result<bool>;

    /// Atomically move the oldest due PENDING job of one of `kinds` to
    /// PROCESSING and count the attempt.
    async fn claim_next(&self, kinds: &[JobKind], now_ms: i64) -> Result<Option<JobDbModel>>;

    async fn mark_completed(&self, id: &str) -> Result<()>;

    /// Back to PENDING, not claimable before `run_at_ms`.
    async fn reschedule(&self, id: &str, run_at_ms: i64, error: &str) -> Result<()>;

    async fn mark_failed(&self, id: &str, error: &str) -> Result<()>;

    async fn get_job(&self, id: &str) -> Result<JobDbModel>;

    async fn list_by_kind(&self, kind: JobKind) -> Result<Vec<JobDbModel>>;

    /// PENDING or PROCESSING jobs of `kind`.
    async fn count_active(&self, kind: JobKind) -> Result<i64>;

    /// Requeue jobs left PROCESSING by a previous process.
    async fn reset_processing(&self) -> Result<u64>;

    /// Delete COMPLETED and FAILED jobs last touched before the cutoff.
    async fn delete_finished_before(&self, cutoff_ms: i64) -> Result<u64>;
}

pub struct SqlxJobRepository {
    pool: SqlitePool,
}

impl SqlxJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn claim_once(&self, kinds: &[JobKind], now: i64) -> Result<Option<JobDbModel>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "UPDATE jobs SET status = 'PROCESSING', attempts = attempts + 1, updated_at = ",
        );
        query.push_bind(now);
        query.push(
            " WHERE status = 'PENDING' AND id = (SELECT id FROM jobs WHERE status = 'PENDING' AND run_at <= ",
        );
        query.push_bind(now);
        query.push(" AND kind IN (");
        let mut separated = query.separated(", ");
        for kind in kinds {
            separated.push_bind(kind.as_str());
        }
        separated.push_unseparated(") ORDER BY run_at ASC, created_at ASC LIMIT 1) RETURNING *");

        let job = query
            .build_query_as::<JobDbModel>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }
}

#[async_trait]
impl JobRepository for SqlxJobRepository {
    async fn insert(&self, job: &JobDbModel) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (
                id, kind, payload, status, attempts, max_attempts, backoff_ms,
                run_at, last_error, dedupe_key, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (dedupe_key) DO NOTHING
            "#,
        )
        .bind(&job.id)
        .bind(&job.kind)
        .bind(&job.payload)
        .bind(&job.status)
        .bind(job.attempts)
        .bind(job.max_attempts)
        .bind(job.backoff_ms)
        .bind(job.run_at)
        .bind(&job.last_error)
        .bind(&job.dedupe_key)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn claim_next(&self, kinds: &[JobKind], now: i64) -> Result<Option<JobDbModel>> {
        if kinds.is_empty() {
            return Ok(None);
        }
        retry_on_sqlite_busy("claim_next", || self.claim_once(kinds, now)).await
    }

    async fn mark_completed(&self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'COMPLETED', last_error = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(now_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reschedule(&self, id: &str, run_at_ms: i64, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'PENDING', run_at = ?, last_error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(run_at_ms)
        .bind(error)
        .bind(now_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: &str, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'FAILED', last_error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(error)
        .bind(now_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<JobDbModel> {
        sqlx::query_as::<_, JobDbModel>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Job", id))
    }

    async fn list_by_kind(&self, kind: JobKind) -> Result<Vec<JobDbModel>> {
        let jobs = sqlx::query_as::<_, JobDbModel>(
            "SELECT * FROM jobs WHERE kind = ? ORDER BY created_at ASC",
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn count_active(&self, kind: JobKind) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE kind = ? AND status IN ('PENDING', 'PROCESSING')",
        )
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn reset_processing(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'PENDING', updated_at = ? WHERE status = 'PROCESSING'",
        )
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_finished_before(&self, cutoff_ms: i64) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM jobs WHERE status IN ('COMPLETED', 'FAILED') AND updated_at < ?",
        )
        .bind(cutoff_ms)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
