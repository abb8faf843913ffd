//! Read-through decorator: answer from storage while it is fresh.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use github_api::RepoSlug;
use tracing::{debug, instrument};

use super::{GithubRepo, ListReleasesOptions, Release, ReleaseQuery};
use crate::Result;
use crate::database::repositories::{ReleaseRepository, RepoRepository};

pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

pub struct ReadCacheQuery {
    inner: Arc<dyn ReleaseQuery>,
    slug: RepoSlug,
    repos: Arc<dyn RepoRepository>,
    releases: Arc<dyn ReleaseRepository>,
    cache_timeout: Duration,
}

impl ReadCacheQuery {
    pub fn new(
        inner: Arc<dyn ReleaseQuery>,
        slug: RepoSlug,
        repos: Arc<dyn RepoRepository>,
        releases: Arc<dyn ReleaseRepository>,
    ) -> Self {
        Self {
            inner,
            slug,
            repos,
            releases,
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
        }
    }

    pub fn with_cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }

    fn is_stale(&self, repo: &GithubRepo) -> bool {
        let Some(checked) = repo.last_release_check else {
            return true;
        };
        let age = Utc::now().signed_duration_since(checked);
        match age.to_std() {
            Ok(age) => age > self.cache_timeout,
            // Checked "in the future": clock skew, treat as fresh.
            Err(_) => false,
        }
    }
}

#[async_trait]
impl ReleaseQuery for ReadCacheQuery {
    async fn get_repo(&self) -> Result<GithubRepo> {
        match self
            .repos
            .find_by_slug(&self.slug.owner, &self.slug.name)
            .await?
        {
            Some(row) => Ok(row.into()),
            None => self.inner.get_repo().await,
        }
    }

    #[instrument(skip(self), fields(repo = %self.slug))]
    async fn list_releases(&self, options: ListReleasesOptions) -> Result<Vec<Release>> {
        let repo = self.get_repo().await?;
        let Some(repo_id) = repo.id.as_deref() else {
            debug!("Repository not stored, delegating");
            return self.inner.list_releases(options).await;
        };

        if self.is_stale(&repo) {
            debug!("Stored releases are stale, delegating");
            return self.inner.list_releases(options).await;
        }

        let stored = self
            .releases
            .list_for_repo(repo_id, options.include_prereleases)
            .await?;
        if stored.is_empty() {
            debug!("No stored releases, delegating");
            return self.inner.list_releases(options).await;
        }

        debug!(count = stored.len(), "Serving releases from storage");
        Ok(stored.into_iter().map(Release::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::RepoDbModel;
    use crate::database::repositories::{SqlxReleaseRepository, SqlxRepoRepository};
    use crate::database::test_pool;
    use crate::database::time::now_ms;
    use crate::releases::testing::{FakeSource, release};

    struct Fixture {
        repos: Arc<SqlxRepoRepository>,
        releases: Arc<SqlxReleaseRepository>,
        source: Arc<FakeSource>,
    }

    impl Fixture {
        async fn new() -> Self {
            let pool = test_pool().await;
            Self {
                repos: Arc::new(SqlxRepoRepository::new(pool.clone())),
                releases: Arc::new(SqlxReleaseRepository::new(pool)),
                source: FakeSource::new("acme", "widget", 42, vec![release(7, "Upstream", false)]),
            }
        }

        fn query(&self) -> ReadCacheQuery {
            ReadCacheQuery::new(
                self.source.clone(),
                RepoSlug::new("acme", "widget"),
                self.repos.clone(),
                self.releases.clone(),
            )
        }

        async fn store_repo(&self, last_check_ms: i64) -> String {
            let row = self
                .repos
                .upsert(&RepoDbModel::new(42, "acme", "widget"))
                .await
                .unwrap()
                .row;
            self.repos
                .mark_checked(&[row.id.clone()], last_check_ms)
                .await
                .unwrap();
            row.id
        }

        async fn store_release(&self, repo_id: &str) {
            self.releases
                .upsert(&release(3, "Stored", false).to_db_model(repo_id))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn unknown_repo_comes_from_source_without_id() {
        let fx = Fixture::new().await;
        let repo = fx.query().get_repo().await.unwrap();
        assert!(repo.id.is_none());
        assert_eq!(repo.github_id, 42);
        assert_eq!(fx.source.calls(), 1);
    }

    #[tokio::test]
    async fn stored_repo_is_served_locally() {
        let fx = Fixture::new().await;
        let id = fx.store_repo(now_ms()).await;
        let repo = fx.query().get_repo().await.unwrap();
        assert_eq!(repo.id.as_deref(), Some(id.as_str()));
        assert!(repo.last_release_check.is_some());
        assert_eq!(fx.source.calls(), 0);
    }

    #[tokio::test]
    async fn fresh_stored_releases_skip_the_source() {
        let fx = Fixture::new().await;
        let id = fx.store_repo(now_ms()).await;
        fx.store_release(&id).await;

        let releases = fx
            .query()
            .list_releases(ListReleasesOptions::default())
            .await
            .unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].name, "Stored");
        assert!(releases[0].id.is_some());
        assert_eq!(fx.source.calls(), 0);
    }

    #[tokio::test]
    async fn stale_repo_bypasses_storage() {
        let fx = Fixture::new().await;
        let id = fx.store_repo(now_ms() - 25 * 60 * 60 * 1000).await;
        fx.store_release(&id).await;

        let releases = fx
            .query()
            .list_releases(ListReleasesOptions::default())
            .await
            .unwrap();
        assert_eq!(releases[0].name, "Upstream");
        assert_eq!(fx.source.list_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn short_timeout_makes_recent_check_stale() {
        let fx = Fixture::new().await;
        let id = fx.store_repo(now_ms() - 5_000).await;
        fx.store_release(&id).await;

        let releases = fx
            .query()
            .with_cache_timeout(Duration::from_secs(1))
            .list_releases(ListReleasesOptions::default())
            .await
            .unwrap();
        assert_eq!(releases[0].name, "Upstream");
    }

    #[tokio::test]
    async fn fresh_but_empty_storage_delegates() {
        let fx = Fixture::new().await;
        fx.store_repo(now_ms()).await;

        let releases = fx
            .query()
            .list_releases(ListReleasesOptions::default())
            .await
            .unwrap();
        assert_eq!(releases[0].name, "Upstream");
    }
}
