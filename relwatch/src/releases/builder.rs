//! Composes the upstream query and cache decorators for one repository.

use std::sync::Arc;
use std::time::Duration;

use github_api::RepoSlug;

use super::read_cache::DEFAULT_CACHE_TIMEOUT;
use super::{ReadCacheQuery, ReleasePublisher, ReleaseQuery, SourceFactory, WriteCacheQuery};
use crate::Result;
use crate::database::repositories::{ReleaseRepository, RepoRepository};

/// Collaborators shared by every pipeline the builder produces.
pub struct CacheContext {
    pub repos: Arc<dyn RepoRepository>,
    pub releases: Arc<dyn ReleaseRepository>,
    pub publisher: Arc<dyn ReleasePublisher>,
    pub sources: Arc<dyn SourceFactory>,
    pub cache_timeout: Duration,
}

impl CacheContext {
    pub fn new(
        repos: Arc<dyn RepoRepository>,
        releases: Arc<dyn ReleaseRepository>,
        publisher: Arc<dyn ReleasePublisher>,
        sources: Arc<dyn SourceFactory>,
    ) -> Self {
        Self {
            repos,
            releases,
            publisher,
            sources,
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
        }
    }

    pub fn with_cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }
}

/// Fluent builder over the four cache presets.
///
/// `build` wraps in a fixed order: the source, then the write cache, then the
/// read cache around whatever came before. With both caches on, a read miss
/// falls through to a source whose answer is persisted on the way back.
pub struct ReleaseQueryBuilder {
    context: Arc<CacheContext>,
    repo_url: String,
    read_cache: bool,
    write_cache: bool,
    access_key: Option<String>,
    source_of_truth: Option<Arc<dyn ReleaseQuery>>,
}

impl ReleaseQueryBuilder {
    /// No caching until a preset or `with_*_cache` says otherwise.
    pub fn new(context: Arc<CacheContext>, repo_url: impl Into<String>) -> Self {
        Self {
            context,
            repo_url: repo_url.into(),
            read_cache: false,
            write_cache: false,
            access_key: None,
            source_of_truth: None,
        }
    }

    pub fn read_only(context: Arc<CacheContext>, repo_url: impl Into<String>) -> Self {
        Self::new(context, repo_url)
            .with_read_cache(true)
            .with_write_cache(false)
    }

    pub fn write_only(context: Arc<CacheContext>, repo_url: impl Into<String>) -> Self {
        Self::new(context, repo_url)
            .with_read_cache(false)
            .with_write_cache(true)
    }

    pub fn no_cache(context: Arc<CacheContext>, repo_url: impl Into<String>) -> Self {
        Self::new(context, repo_url)
            .with_read_cache(false)
            .with_write_cache(false)
    }

    pub fn full_cache(context: Arc<CacheContext>, repo_url: impl Into<String>) -> Self {
        Self::new(context, repo_url)
            .with_read_cache(true)
            .with_write_cache(true)
    }

    pub fn with_read_cache(mut self, enabled: bool) -> Self {
        self.read_cache = enabled;
        self
    }

    pub fn with_write_cache(mut self, enabled: bool) -> Self {
        self.write_cache = enabled;
        self
    }

    /// Upstream credential for this pipeline. Blank keys are ignored.
    pub fn with_access_key(mut self, key: Option<String>) -> Self {
        self.access_key = key.filter(|k| !k.trim().is_empty());
        self
    }

    /// Replace the upstream query entirely.
    pub fn with_source_of_truth(mut self, source: Arc<dyn ReleaseQuery>) -> Self {
        self.source_of_truth = Some(source);
        self
    }

    pub fn build(self) -> Result<Arc<dyn ReleaseQuery>> {
        let slug = RepoSlug::parse(&self.repo_url)?;
        let ctx = &self.context;

        let source = match self.source_of_truth {
            Some(source) => source,
            None => ctx.sources.source_for(&slug, self.access_key.as_deref()),
        };

        let mut query = source;
        if self.write_cache {
            query = Arc::new(WriteCacheQuery::new(
                query,
                ctx.repos.clone(),
                ctx.releases.clone(),
                ctx.publisher.clone(),
            ));
        }
        if self.read_cache {
            query = Arc::new(
                ReadCacheQuery::new(query, slug, ctx.repos.clone(), ctx.releases.clone())
                    .with_cache_timeout(ctx.cache_timeout),
            );
        }

        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::RepoDbModel;
    use crate::database::repositories::{SqlxReleaseRepository, SqlxRepoRepository};
    use crate::database::test_pool;
    use crate::database::time::now_ms;
    use crate::releases::ListReleasesOptions;
    use crate::releases::testing::{FakeSource, FixedSources, RecordingPublisher, release};

    struct Fixture {
        context: Arc<CacheContext>,
        sources: Arc<FixedSources>,
        publisher: Arc<RecordingPublisher>,
        repos: Arc<SqlxRepoRepository>,
    }

    async fn fixture() -> Fixture {
        let pool = test_pool().await;
        let repos = Arc::new(SqlxRepoRepository::new(pool.clone()));
        let publisher = Arc::new(RecordingPublisher::default());
        let sources = FixedSources::new(FakeSource::new(
            "acme",
            "widget",
            42,
            vec![release(7, "Seven", false)],
        ));
        let context = Arc::new(CacheContext::new(
            repos.clone(),
            Arc::new(SqlxReleaseRepository::new(pool)),
            publisher.clone(),
            sources.clone(),
        ));
        Fixture {
            context,
            sources,
            publisher,
            repos,
        }
    }

    const URL: &str = "https://github.com/acme/widget";

    #[tokio::test]
    async fn no_cache_never_touches_storage() {
        let fx = fixture().await;
        let query = ReleaseQueryBuilder::no_cache(fx.context.clone(), URL).build().unwrap();
        query.list_releases(ListReleasesOptions::default()).await.unwrap();
        assert!(fx.repos.find_by_github_id(42).await.unwrap().is_none());
        assert!(fx.publisher.published.lock().is_empty());
    }

    #[tokio::test]
    async fn write_only_persists_but_always_fetches() {
        let fx = fixture().await;
        let query = ReleaseQueryBuilder::write_only(fx.context.clone(), URL).build().unwrap();
        query.list_releases(ListReleasesOptions::default()).await.unwrap();
        query.list_releases(ListReleasesOptions::default()).await.unwrap();
        assert!(fx.repos.find_by_github_id(42).await.unwrap().is_some());
        assert_eq!(fx.sources.source.list_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(fx.publisher.published.lock().len(), 1);
    }

    #[tokio::test]
    async fn read_only_on_cold_storage_delegates_without_writing() {
        let fx = fixture().await;
        let query = ReleaseQueryBuilder::read_only(fx.context.clone(), URL).build().unwrap();
        let releases = query.list_releases(ListReleasesOptions::default()).await.unwrap();
        assert_eq!(releases.len(), 1);
        assert!(releases[0].id.is_none());
        assert!(fx.repos.find_by_github_id(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn full_cache_checks_then_fetches_then_stores() {
        let fx = fixture().await;
        let build = || {
            ReleaseQueryBuilder::full_cache(fx.context.clone(), URL)
                .build()
                .unwrap()
        };

        let first = build().list_releases(ListReleasesOptions::default()).await.unwrap();
        assert!(first[0].id.is_some());
        let repo_id = first[0].repo_id.clone().unwrap();
        fx.repos.mark_checked(&[repo_id], now_ms()).await.unwrap();
        let calls = fx.sources.source.calls();

        let second = build().list_releases(ListReleasesOptions::default()).await.unwrap();
        assert_eq!(second[0].id, first[0].id);
        assert_eq!(fx.sources.source.calls(), calls);
        assert_eq!(fx.publisher.published.lock().len(), 1);
    }

    #[tokio::test]
    async fn explicit_source_and_access_key() {
        let fx = fixture().await;
        let custom = FakeSource::new("acme", "widget", 42, Vec::new());

        ReleaseQueryBuilder::no_cache(fx.context.clone(), URL)
            .with_source_of_truth(custom.clone())
            .build()
            .unwrap()
            .get_repo()
            .await
            .unwrap();
        assert_eq!(custom.calls(), 1);
        assert!(fx.sources.keys.lock().is_empty());

        ReleaseQueryBuilder::no_cache(fx.context.clone(), URL)
            .with_access_key(Some("gho_token".to_string()))
            .build()
            .unwrap();
        ReleaseQueryBuilder::no_cache(fx.context.clone(), URL)
            .with_access_key(Some(" ".to_string()))
            .build()
            .unwrap();
        assert_eq!(
            *fx.sources.keys.lock(),
            vec![Some("gho_token".to_string()), None]
        );
    }

    #[tokio::test]
    async fn invalid_url_fails_to_build() {
        let fx = fixture().await;
        assert!(
            ReleaseQueryBuilder::full_cache(fx.context.clone(), "https://example.com/x")
                .build()
                .is_err()
        );
    }

    #[tokio::test]
    async fn stored_repo_seen_through_read_cache() {
        let fx = fixture().await;
        fx.repos
            .upsert(&RepoDbModel::new(42, "acme", "widget"))
            .await
            .unwrap();
        let repo = ReleaseQueryBuilder::read_only(fx.context.clone(), URL)
            .build()
            .unwrap()
            .get_repo()
            .await
            .unwrap();
        assert!(repo.id.is_some());
        assert_eq!(fx.sources.source.calls(), 0);
    }
}
