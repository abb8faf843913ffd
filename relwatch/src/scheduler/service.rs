//! One scheduler run over the stalest subscribed repositories.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use github_api::RepoSlug;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::Result;
use crate::database::models::{JobKind, RepoDbModel};
use crate::database::time::now_ms;
use crate::queue::{JobHandler, QueuedJob};
use crate::releases::{CacheContext, ListReleasesOptions, ReleaseQueryBuilder};

pub const DEFAULT_BATCH_SIZE: u32 = 10;

/// Raised by the first rate-limited repository; ends the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHalt {
    pub reset_at: DateTime<Utc>,
    pub repo_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckRunReport {
    /// Checked (successfully or not); their freshness was advanced.
    pub processed: Vec<String>,
    /// Not checked because of a halt; freshness untouched.
    pub skipped: Vec<String>,
    pub halt: Option<RateLimitHalt>,
    /// Another run held the lock; nothing was done.
    pub already_running: bool,
}

impl CheckRunReport {
    fn already_running() -> Self {
        Self {
            already_running: true,
            ..Default::default()
        }
    }
}

pub struct ReleaseCheckScheduler {
    context: Arc<CacheContext>,
    batch_size: u32,
    access_key: Option<String>,
    run_lock: Mutex<()>,
}

impl ReleaseCheckScheduler {
    pub fn new(context: Arc<CacheContext>) -> Self {
        Self {
            context,
            batch_size: DEFAULT_BATCH_SIZE,
            access_key: None,
            run_lock: Mutex::new(()),
        }
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Credential for the upstream calls made by runs.
    pub fn with_access_key(mut self, key: Option<String>) -> Self {
        self.access_key = key;
        self
    }

    /// Check one batch of repositories, sequentially.
    ///
    /// A rate-limited repository halts the run: it and everything after it
    /// are skipped so they stay oldest for the next run. Any other failure is
    /// logged and the repository still counts as processed. Returns
    /// immediately if another run is in progress.
    pub async fn run_once(&self) -> Result<CheckRunReport> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            debug!("Release check already running, skipping");
            return Ok(CheckRunReport::already_running());
        };

        let repos = self
            .context
            .repos
            .list_stale_subscribed(self.batch_size)
            .await?;
        if repos.is_empty() {
            debug!("No repositories to check");
            return Ok(CheckRunReport::default());
        }
        info!(count = repos.len(), "Checking repositories for new releases");

        let mut report = CheckRunReport::default();
        for repo in repos {
            if report.halt.is_some() {
                report.skipped.push(repo.id);
                continue;
            }

            match self.check_repo(&repo).await {
                Ok(()) => {
                    debug!(owner = %repo.owner, repo = %repo.repo_name, "Repository checked");
                    report.processed.push(repo.id);
                }
                Err(e) => match e.rate_limit_reset() {
                    Some(reset_at) => {
                        warn!(
                            owner = %repo.owner,
                            repo = %repo.repo_name,
                            reset_at = %reset_at,
                            "Rate limit hit, halting this run"
                        );
                        report.halt = Some(RateLimitHalt {
                            reset_at,
                            repo_id: repo.id.clone(),
                        });
                        report.skipped.push(repo.id);
                    }
                    None => {
                        warn!(
                            owner = %repo.owner,
                            repo = %repo.repo_name,
                            error = %e,
                            "Release check failed"
                        );
                        report.processed.push(repo.id);
                    }
                },
            }
        }

        if !report.processed.is_empty() {
            self.context
                .repos
                .mark_checked(&report.processed, now_ms())
                .await?;
        }

        info!(
            processed = report.processed.len(),
            skipped = report.skipped.len(),
            rate_limited = report.halt.is_some(),
            "Release check finished"
        );
        Ok(report)
    }

    async fn check_repo(&self, repo: &RepoDbModel) -> Result<()> {
        let url = RepoSlug::new(&repo.owner, &repo.repo_name).html_url();
        let query = ReleaseQueryBuilder::full_cache(self.context.clone(), url)
            .with_access_key(self.access_key.clone())
            .build()?;
        query.list_releases(ListReleasesOptions::default()).await?;
        Ok(())
    }
}

/// Runs a scheduler pass for every `CHECK_RELEASES` job.
pub struct CheckReleasesHandler {
    scheduler: Arc<ReleaseCheckScheduler>,
}

impl CheckReleasesHandler {
    pub fn new(scheduler: Arc<ReleaseCheckScheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl JobHandler for CheckReleasesHandler {
    fn name(&self) -> &'static str {
        "check-releases"
    }

    fn kinds(&self) -> &'static [JobKind] {
        &[JobKind::CheckReleases]
    }

    async fn handle(&self, _job: &QueuedJob) -> Result<()> {
        self.scheduler.run_once().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repositories::{
        RepoRepository, SqlxReleaseRepository, SqlxRepoRepository, SqlxSubscriptionRepository,
        SqlxUserRepository, SubscriptionRepository, UserRepository,
    };
    use crate::database::test_pool;
    use crate::releases::testing::{FakeSource, RecordingPublisher, release};
    use crate::releases::{ReleaseQuery, SourceFactory};
    use std::collections::HashMap;

    /// Per-repository sources keyed by name.
    struct NamedSources(HashMap<String, Arc<FakeSource>>);

    impl SourceFactory for NamedSources {
        fn source_for(&self, slug: &RepoSlug, _key: Option<&str>) -> Arc<dyn ReleaseQuery> {
            self.0[&slug.name].clone()
        }
    }

    struct Fixture {
        scheduler: ReleaseCheckScheduler,
        repos: Arc<SqlxRepoRepository>,
        ids: Vec<String>,
    }

    /// `count` subscribed repositories checked long ago, oldest first. The
    /// repository at `limited` (0-based) is rate limited upstream.
    async fn fixture(count: usize, limited: Option<usize>, broken: Option<usize>) -> Fixture {
        let pool = test_pool().await;
        let repos = Arc::new(SqlxRepoRepository::new(pool.clone()));
        let users = SqlxUserRepository::new(pool.clone());
        let subs = SqlxSubscriptionRepository::new(pool.clone());
        let user = users.upsert_by_username("octo", Some("o@example.com"), None).await.unwrap();

        let mut sources = HashMap::new();
        let mut ids = Vec::new();
        for i in 0..count {
            let name = format!("repo{i}");
            let github_id = 100 + i as i64;
            let row = repos
                .upsert(&RepoDbModel::new(github_id, "acme", &name))
                .await
                .unwrap()
                .row;
            repos.mark_checked(&[row.id.clone()], i as i64).await.unwrap();
            subs.subscribe(&user.id, &row.id).await.unwrap();
            ids.push(row.id);

            let source = if Some(i) == limited {
                FakeSource::rate_limited("acme", &name, github_id)
            } else if Some(i) == broken {
                FakeSource::not_found("acme", &name, github_id)
            } else {
                FakeSource::new("acme", &name, github_id, vec![release(i as i64 + 1, "r", false)])
            };
            sources.insert(name, source);
        }

        let context = Arc::new(CacheContext::new(
            repos.clone(),
            Arc::new(SqlxReleaseRepository::new(pool)),
            Arc::new(RecordingPublisher::default()),
            Arc::new(NamedSources(sources)),
        ));
        Fixture {
            scheduler: ReleaseCheckScheduler::new(context),
            repos,
            ids,
        }
    }

    async fn last_check(repos: &SqlxRepoRepository, id: &str) -> i64 {
        repos.find_by_id(id).await.unwrap().unwrap().last_release_check
    }

    #[tokio::test]
    async fn rate_limit_on_third_of_ten_halts_the_run() {
        let fx = fixture(10, Some(2), None).await;
        let before = now_ms();

        let report = fx.scheduler.run_once().await.unwrap();
        assert_eq!(report.processed, fx.ids[..2].to_vec());
        assert_eq!(report.skipped, fx.ids[2..].to_vec());
        assert_eq!(report.halt.as_ref().map(|h| h.repo_id.as_str()), Some(fx.ids[2].as_str()));

        for id in &fx.ids[..2] {
            assert!(last_check(&fx.repos, id).await >= before);
        }
        for (i, id) in fx.ids.iter().enumerate().skip(2) {
            assert_eq!(last_check(&fx.repos, id).await, i as i64);
        }

        // Skipped repositories are now the oldest and come first next time.
        let next = fx.repos.list_stale_subscribed(3).await.unwrap();
        assert_eq!(next[0].id, fx.ids[2]);
    }

    #[tokio::test]
    async fn batch_size_limits_the_run() {
        let fx = fixture(5, None, None).await;
        let scheduler = fx.scheduler.with_batch_size(2);
        let report = scheduler.run_once().await.unwrap();
        assert_eq!(report.processed, fx.ids[..2].to_vec());
        assert!(report.skipped.is_empty());
        assert!(report.halt.is_none());
    }

    #[tokio::test]
    async fn ordinary_failures_still_advance_freshness() {
        let fx = fixture(3, None, Some(1)).await;
        let before = now_ms();

        let report = fx.scheduler.run_once().await.unwrap();
        assert_eq!(report.processed, fx.ids);
        assert!(report.halt.is_none());
        assert!(last_check(&fx.repos, &fx.ids[1]).await >= before);
    }

    #[tokio::test]
    async fn overlapping_run_is_rejected() {
        let fx = fixture(1, None, None).await;
        let guard = fx.scheduler.run_lock.lock().await;
        let report = fx.scheduler.run_once().await.unwrap();
        assert!(report.already_running);
        drop(guard);
        assert!(!fx.scheduler.run_once().await.unwrap().already_running);
    }

    #[tokio::test]
    async fn nothing_subscribed_is_an_empty_report() {
        let fx = fixture(0, None, None).await;
        assert_eq!(fx.scheduler.run_once().await.unwrap(), CheckRunReport::default());
    }
}
