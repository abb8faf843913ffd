//! Service container: builds every component from [`AppConfig`] and owns
//! their lifecycle.

use std::sync::Arc;
use std::time::Duration;

use github_api::{GithubClient, GithubClientConfig};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::Result;
use crate::config::AppConfig;
use crate::database::repositories::{
    SqlxJobRepository, SqlxReleaseRepository, SqlxRepoRepository, SqlxSubscriptionRepository,
    SqlxUserRepository, UserRepository,
};
use crate::database::{self, DbPool};
use crate::notification::{
    LogMailer, MailTransport, ReleaseEmailHandler, ReleaseFanout, SmtpMailer,
};
use crate::queue::{JobQueue, WorkerPool, WorkerPoolConfig};
use crate::releases::{CacheContext, GithubSourceFactory, SourceFactory};
use crate::scheduler::{CheckReleasesHandler, PeriodicTrigger, ReleaseCheckScheduler};
use crate::subscriptions::SubscriptionService;

/// A scheduler run over a full batch may legitimately take a while.
const SCHEDULER_JOB_TIMEOUT: Duration = Duration::from_secs(30 * 60);

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ServiceContainer {
    pub pool: DbPool,
    pub config: AppConfig,
    pub job_queue: Arc<JobQueue>,
    pub cache_context: Arc<CacheContext>,
    pub scheduler: Arc<ReleaseCheckScheduler>,
    pub subscriptions: Arc<SubscriptionService>,
    pub users: Arc<dyn UserRepository>,
    scheduler_pool: WorkerPool,
    fanout_pool: WorkerPool,
    email_pool: WorkerPool,
    check_handler: Arc<CheckReleasesHandler>,
    fanout: Arc<ReleaseFanout>,
    email_handler: Arc<ReleaseEmailHandler>,
    trigger_task: Mutex<Option<JoinHandle<()>>>,
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    /// Open storage, run migrations and wire the GitHub-backed pipeline.
    pub async fn new(config: AppConfig) -> Result<Self> {
        let pool = if config.database_url.contains(":memory:") {
            database::init_memory_pool().await?
        } else {
            database::init_pool(&config.database_url).await?
        };
        database::run_migrations(&pool).await?;

        let client = github_client(&config, config.github_token.clone())?;
        let sources: Arc<dyn SourceFactory> = Arc::new(GithubSourceFactory::new(client));
        let mailer = mailer_for(&config)?;

        Self::with_dependencies(pool, config, sources, mailer)
    }

    /// Wire everything over an already migrated pool with the given upstream
    /// and mail transport.
    pub fn with_dependencies(
        pool: DbPool,
        config: AppConfig,
        sources: Arc<dyn SourceFactory>,
        mailer: Arc<dyn MailTransport>,
    ) -> Result<Self> {
        info!("Initializing service container");

        let repos = Arc::new(SqlxRepoRepository::new(pool.clone()));
        let releases = Arc::new(SqlxReleaseRepository::new(pool.clone()));
        let subscriptions_repo = Arc::new(SqlxSubscriptionRepository::new(pool.clone()));
        let users: Arc<dyn UserRepository> = Arc::new(SqlxUserRepository::new(pool.clone()));

        let job_queue = Arc::new(
            JobQueue::new(Arc::new(SqlxJobRepository::new(pool.clone())))
                .with_default_max_attempts(config.job_max_attempts),
        );

        let cache_context = Arc::new(
            CacheContext::new(repos, releases, job_queue.clone(), sources)
                .with_cache_timeout(config.release_cache_timeout),
        );

        let scheduler = Arc::new(
            ReleaseCheckScheduler::new(cache_context.clone())
                .with_batch_size(config.check_batch_size)
                .with_access_key(config.github_token.clone()),
        );

        let search_client = github_client(&config, None)?;
        let subscriptions = Arc::new(SubscriptionService::new(
            cache_context.clone(),
            users.clone(),
            subscriptions_repo.clone(),
            search_client,
        ));

        let scheduler_pool = WorkerPool::new(
            "scheduler",
            WorkerPoolConfig::default()
                .with_max_workers(1)
                .with_job_timeout(SCHEDULER_JOB_TIMEOUT),
        );
        let fanout_pool = WorkerPool::new(
            "fanout",
            WorkerPoolConfig::default().with_max_workers(config.fanout_concurrency),
        );
        let email_pool = WorkerPool::new(
            "email",
            WorkerPoolConfig::default().with_max_workers(config.email_concurrency),
        );

        let check_handler = Arc::new(CheckReleasesHandler::new(scheduler.clone()));
        let fanout = Arc::new(ReleaseFanout::new(subscriptions_repo, job_queue.clone()));
        let email_handler = Arc::new(ReleaseEmailHandler::new(mailer));

        info!("Service container initialized");

        Ok(Self {
            pool,
            config,
            job_queue,
            cache_context,
            scheduler,
            subscriptions,
            users,
            scheduler_pool,
            fanout_pool,
            email_pool,
            check_handler,
            fanout,
            email_handler,
            trigger_task: Mutex::new(None),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Requeue interrupted jobs, start the worker pools and the cron trigger.
    pub async fn start(&self) -> Result<()> {
        self.job_queue.recover_interrupted().await?;

        self.scheduler_pool
            .start(self.job_queue.clone(), self.check_handler.clone());
        self.fanout_pool
            .start(self.job_queue.clone(), self.fanout.clone());
        self.email_pool
            .start(self.job_queue.clone(), self.email_handler.clone());

        let trigger = PeriodicTrigger::new(self.job_queue.clone(), self.config.schedule()?);
        let handle = trigger.start(self.cancellation_token.child_token());
        *self.trigger_task.lock() = Some(handle);

        info!(schedule = %self.config.cron_schedule, "Services started");
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Stop the trigger, drain the pools and close storage.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<()> {
        info!("Shutting down services (timeout: {:?})", timeout);
        self.cancellation_token.cancel();

        let trigger = self.trigger_task.lock().take();
        let stopped = tokio::time::timeout(timeout, async {
            if let Some(handle) = trigger {
                let _ = handle.await;
            }
            self.scheduler_pool.stop().await;
            self.fanout_pool.stop().await;
            self.email_pool.stop().await;
        })
        .await;

        if stopped.is_err() {
            warn!("Shutdown timeout reached, forcing shutdown");
        }

        self.pool.close().await;
        info!("Services shut down");
        Ok(())
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

fn github_client(config: &AppConfig, token: Option<String>) -> Result<GithubClient> {
    Ok(GithubClient::new(GithubClientConfig {
        base_url: config.github_api_url.clone(),
        token,
        timeout: config.github_request_timeout,
        ..Default::default()
    })?)
}

fn mailer_for(config: &AppConfig) -> Result<Arc<dyn MailTransport>> {
    match &config.smtp {
        Some(smtp) => Ok(Arc::new(SmtpMailer::new(
            smtp,
            &config.email_from,
            &config.email_from_name,
        )?)),
        None => {
            warn!("SMTP_HOST not set, release emails will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn memory_config() -> AppConfig {
        let vars: HashMap<&str, &str> = HashMap::from([("DATABASE_URL", "sqlite::memory:")]);
        AppConfig::from_vars(|k| vars.get(k).map(|v| v.to_string())).unwrap()
    }

    #[tokio::test]
    async fn starts_and_shuts_down() {
        let container = ServiceContainer::new(memory_config()).await.unwrap();
        container.start().await.unwrap();
        assert!(!container.is_shutting_down());

        container
            .shutdown_with_timeout(Duration::from_secs(5))
            .await
            .unwrap();
        assert!(container.is_shutting_down());
        assert!(container.pool.is_closed());
    }

    #[test]
    fn log_mailer_without_smtp() {
        assert!(mailer_for(&memory_config()).is_ok());
    }
}
