//! Release persistence.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use crate::database::models::ReleaseDbModel;
use crate::database::repositories::Upserted;
use crate::{Error, Result};

#[async_trait]
pub trait ReleaseRepository: Send + Sync {
    /// Insert by `(repo_id, github_id)` or update the existing row.
    ///
    /// `inserted` is decided by the same statement that writes, so two racing
    /// upserts of one release can never both report an insert.
    async fn upsert(&self, release: &ReleaseDbModel) -> Result<Upserted<ReleaseDbModel>>;

    async fn find_by_id(&self, id: &str) -> Result<Option<ReleaseDbModel>>;

    /// Remove a release row. Returns whether a row was deleted.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Stored releases of a repository, newest upstream creation first.
    async fn list_for_repo(
        &self,
        repo_id: &str,
        include_prereleases: bool,
    ) -> Result<Vec<ReleaseDbModel>>;
}

pub struct SqlxReleaseRepository {
    pool: SqlitePool,
}

impl SqlxReleaseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn find_by_key(&self, repo_id: &str, github_id: i64) -> Result<Option<ReleaseDbModel>> {
        let release = sqlx::query_as::<_, ReleaseDbModel>(
            "SELECT * FROM github_releases WHERE repo_id = ? AND github_id = ?",
        )
        .bind(repo_id)
        .bind(github_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(release)
    }
}

#[async_trait]
impl ReleaseRepository for SqlxReleaseRepository {
    async fn upsert(&self, release: &ReleaseDbModel) -> Result<Upserted<ReleaseDbModel>> {
        let result = sqlx::query_as::<_, ReleaseDbModel>(
            r#"
            INSERT INTO github_releases (
                id, repo_id, github_id, release_name, tag_name, prerelease,
                release_created_at, body, url, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (repo_id, github_id) DO UPDATE SET
                release_name = excluded.release_name,
                tag_name = excluded.tag_name,
                prerelease = excluded.prerelease,
                release_created_at = excluded.release_created_at,
                body = excluded.body,
                url = excluded.url,
                updated_at = CASE
                    WHEN github_releases.release_name = excluded.release_name
                        AND github_releases.tag_name = excluded.tag_name
                        AND github_releases.prerelease = excluded.prerelease
                        AND github_releases.release_created_at = excluded.release_created_at
                        AND github_releases.body = excluded.body
                        AND github_releases.url = excluded.url
                    THEN github_releases.updated_at
                    ELSE excluded.updated_at
                END
            RETURNING *
            "#,
        )
        .bind(&release.id)
        .bind(&release.repo_id)
        .bind(release.github_id)
        .bind(&release.release_name)
        .bind(&release.tag_name)
        .bind(release.prerelease)
        .bind(release.release_created_at)
        .bind(&release.body)
        .bind(&release.url)
        .bind(release.created_at)
        .bind(release.updated_at)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => {
                let inserted = row.id == release.id;
                Ok(Upserted { row, inserted })
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                debug!(
                    repo_id = %release.repo_id,
                    github_id = release.github_id,
                    "Release upsert collided, using stored row"
                );
                self.find_by_key(&release.repo_id, release.github_id)
                    .await?
                    .map(Upserted::existing)
                    .ok_or_else(|| {
                        Error::PersistenceConflict(format!(
                            "release {} of repo {} conflicts but no stored row was found",
                            release.github_id, release.repo_id
                        ))
                    })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ReleaseDbModel>> {
        let release =
            sqlx::query_as::<_, ReleaseDbModel>("SELECT * FROM github_releases WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(release)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM github_releases WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_for_repo(
        &self,
        repo_id: &str,
        include_prereleases: bool,
    ) -> Result<Vec<ReleaseDbModel>> {
        let releases = sqlx::query_as::<_, ReleaseDbModel>(
            r#"
            SELECT * FROM github_releases
            WHERE repo_id = ? AND (? OR prerelease = 0)
            ORDER BY release_created_at DESC
            "#,
        )
        .bind(repo_id)
        .bind(include_prereleases)
        .fetch_all(&self.pool)
        .await?;
        Ok(releases)
    }
}
