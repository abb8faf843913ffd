//! Repository (GitHub repo) persistence.

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use crate::database::models::RepoDbModel;
use crate::database::time::now_ms;
use crate::database::repositories::Upserted;
use crate::{Error, Result};

#[async_trait]
pub trait RepoRepository: Send + Sync {
    /// Insert by upstream id, or refresh owner/name of the existing row.
    ///
    /// Never touches `last_release_check` of an existing row.
    async fn upsert(&self, repo: &RepoDbModel) -> Result<Upserted<RepoDbModel>>;

    async fn find_by_id(&self, id: &str) -> Result<Option<RepoDbModel>>;

    async fn find_by_github_id(&self, github_id: i64) -> Result<Option<RepoDbModel>>;

    /// Point lookup by lowercased owner and name.
    async fn find_by_slug(&self, owner: &str, repo_name: &str) -> Result<Option<RepoDbModel>>;

    /// Repositories with at least one subscription, least recently checked first.
    async fn list_stale_subscribed(&self, limit: u32) -> Result<Vec<RepoDbModel>>;

    /// Set `last_release_check` for every id in one statement.
    async fn mark_checked(&self, ids: &[String], checked_at_ms: i64) -> Result<u64>;
}

pub struct SqlxRepoRepository {
    pool: SqlitePool,
}

impl SqlxRepoRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RepoRepository for SqlxRepoRepository {
    async fn upsert(&self, repo: &RepoDbModel) -> Result<Upserted<RepoDbModel>> {
        let result = sqlx::query_as::<_, RepoDbModel>(
            r#"
            INSERT INTO repos (
                id, github_id, owner, repo_name, last_release_check, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (github_id) DO UPDATE SET
                owner = excluded.owner,
                repo_name = excluded.repo_name,
                updated_at = CASE
                    WHEN repos.owner = excluded.owner AND repos.repo_name = excluded.repo_name
                    THEN repos.updated_at
                    ELSE excluded.updated_at
                END
            RETURNING *
            "#,
        )
        .bind(&repo.id)
        .bind(repo.github_id)
        .bind(&repo.owner)
        .bind(&repo.repo_name)
        .bind(repo.last_release_check)
        .bind(repo.created_at)
        .bind(repo.updated_at)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => {
                let inserted = row.id == repo.id;
                Ok(Upserted { row, inserted })
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                // (owner, repo_name) already taken by another upstream id.
                debug!(
                    owner = %repo.owner,
                    repo = %repo.repo_name,
                    "Repository upsert collided, using stored row"
                );
                let existing = match self.find_by_github_id(repo.github_id).await? {
                    Some(row) => Some(row),
                    None => self.find_by_slug(&repo.owner, &repo.repo_name).await?,
                };
                existing.map(Upserted::existing).ok_or_else(|| {
                    Error::PersistenceConflict(format!(
                        "repository {}/{} conflicts but no stored row was found",
                        repo.owner, repo.repo_name
                    ))
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<RepoDbModel>> {
        let repo = sqlx::query_as::<_, RepoDbModel>("SELECT * FROM repos WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(repo)
    }

    async fn find_by_github_id(&self, github_id: i64) -> Result<Option<RepoDbModel>> {
        let repo = sqlx::query_as::<_, RepoDbModel>("SELECT * FROM repos WHERE github_id = ?")
            .bind(github_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(repo)
    }

    async fn find_by_slug(&self, owner: &str, repo_name: &str) -> Result<Option<RepoDbModel>> {
        let repo = sqlx::query_as::<_, RepoDbModel>(
            "SELECT * FROM repos WHERE owner = ? AND repo_name = ?",
        )
        .bind(owner.to_lowercase())
        .bind(repo_name.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;
        Ok(repo)
    }

    async fn list_stale_subscribed(&self, limit: u32) -> Result<Vec<RepoDbModel>> {
        let repos = sqlx::query_as::<_, RepoDbModel>(
            r#"
            SELECT r.* FROM repos r
            WHERE EXISTS (
                SELECT 1 FROM app_user_repo_subscriptions s WHERE s.repo_id = r.id
            )
            ORDER BY r.last_release_check ASC, r.created_at ASC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(repos)
    }

    async fn mark_checked(&self, ids: &[String], checked_at_ms: i64) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE repos SET last_release_check = ");
        query.push_bind(checked_at_ms);
        query.push(", updated_at = ");
        query.push_bind(now_ms());
        query.push(" WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let result = query.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
