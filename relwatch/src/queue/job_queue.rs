//! Queue front-end over [`JobRepository`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::backoff::retry_delay;
use crate::database::models::{JobDbModel, JobKind};
use crate::database::repositories::JobRepository;
use crate::database::time::{datetime_to_ms, duration_ms, now_ms};
use crate::releases::{InsertedRelease, ReleasePublisher};
use crate::{Error, Result};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(30);
pub const CHECK_RELEASES_BACKOFF: Duration = Duration::from_secs(60);

/// Per-job retry and dedupe settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOptions {
    pub max_attempts: u32,
    /// Base of the exponential retry delay.
    pub backoff: Duration,
    /// At most one job per key ever exists.
    pub dedupe_key: Option<String>,
    /// Hold the job back this long before it becomes claimable.
    pub delay: Option<Duration>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
            dedupe_key: None,
            delay: None,
        }
    }
}

impl JobOptions {
    pub fn with_dedupe_key(mut self, key: impl Into<String>) -> Self {
        self.dedupe_key = Some(key.into());
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued(String),
    /// A job with the same dedupe key already exists.
    Duplicate,
}

impl EnqueueOutcome {
    pub fn is_enqueued(&self) -> bool {
        matches!(self, Self::Enqueued(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOutcome {
    Retrying { run_at: DateTime<Utc> },
    Failed,
}

/// A claimed job, handed to a handler.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: String,
    pub kind: JobKind,
    pub payload: String,
    /// Attempts including the current one.
    pub attempts: u32,
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl QueuedJob {
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.payload)?)
    }

    fn from_model(model: JobDbModel) -> Result<Self> {
        let kind = model
            .job_kind()
            .ok_or_else(|| Error::Other(format!("unknown job kind '{}'", model.kind)))?;
        Ok(Self {
            id: model.id,
            kind,
            payload: model.payload,
            attempts: u32::try_from(model.attempts).unwrap_or(u32::MAX),
            max_attempts: u32::try_from(model.max_attempts).unwrap_or(1),
            backoff: Duration::from_millis(u64::try_from(model.backoff_ms).unwrap_or(0)),
        })
    }
}

pub struct JobQueue {
    repo: Arc<dyn JobRepository>,
    notify: Arc<Notify>,
    default_max_attempts: u32,
}

impl JobQueue {
    pub fn new(repo: Arc<dyn JobRepository>) -> Self {
        Self {
            repo,
            notify: Arc::new(Notify::new()),
            default_max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Attempt ceiling for fan-out and notification jobs.
    pub fn with_default_max_attempts(mut self, attempts: u32) -> Self {
        self.default_max_attempts = attempts.max(1);
        self
    }

    /// Woken whenever a job is enqueued.
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Defaults for a kind: the periodic check keeps its own retry policy.
    pub fn options_for(&self, kind: JobKind) -> JobOptions {
        match kind {
            JobKind::CheckReleases => JobOptions::default()
                .with_max_attempts(DEFAULT_MAX_ATTEMPTS)
                .with_backoff(CHECK_RELEASES_BACKOFF),
            JobKind::ReleaseInserted | JobKind::ReleaseNotification => {
                JobOptions::default().with_max_attempts(self.default_max_attempts)
            }
        }
    }

    pub async fn enqueue<T: Serialize + ?Sized>(
        &self,
        kind: JobKind,
        payload: &T,
        options: JobOptions,
    ) -> Result<EnqueueOutcome> {
        let payload = serde_json::to_string(payload)?;
        let mut job = JobDbModel::new(
            kind,
            payload,
            options.max_attempts,
            duration_ms(options.backoff),
        );
        if let Some(delay) = options.delay {
            job.run_at = job.run_at.saturating_add(duration_ms(delay));
        }
        if let Some(key) = options.dedupe_key {
            job = job.with_dedupe_key(key);
        }

        if !self.repo.insert(&job).await? {
            debug!(kind = %kind, dedupe_key = ?job.dedupe_key, "Duplicate job skipped");
            return Ok(EnqueueOutcome::Duplicate);
        }

        debug!(job_id = %job.id, kind = %kind, "Job enqueued");
        self.notify.notify_waiters();
        Ok(EnqueueOutcome::Enqueued(job.id))
    }

    pub async fn claim_next(&self, kinds: &[JobKind]) -> Result<Option<QueuedJob>> {
        let Some(model) = self.repo.claim_next(kinds, now_ms()).await? else {
            return Ok(None);
        };

        match QueuedJob::from_model(model.clone()) {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                // Not claimable by anyone; park it instead of spinning on it.
                self.repo.mark_failed(&model.id, &e.to_string()).await?;
                Err(e)
            }
        }
    }

    pub async fn complete(&self, job_id: &str) -> Result<()> {
        self.repo.mark_completed(job_id).await
    }

    /// Reschedule with backoff, or give up once attempts are exhausted.
    pub async fn fail(&self, job: &QueuedJob, error: &str) -> Result<FailOutcome> {
        if job.attempts >= job.max_attempts {
            warn!(
                job_id = %job.id,
                kind = %job.kind,
                attempts = job.attempts,
                error = %error,
                "Job failed permanently"
            );
            self.repo.mark_failed(&job.id, error).await?;
            return Ok(FailOutcome::Failed);
        }

        let delay = retry_delay(job.backoff, job.attempts);
        let run_at = Utc::now() + chrono::Duration::milliseconds(duration_ms(delay));
        warn!(
            job_id = %job.id,
            kind = %job.kind,
            attempt = job.attempts,
            retry_in = ?delay,
            error = %error,
            "Job failed, will retry"
        );
        self.repo
            .reschedule(&job.id, datetime_to_ms(run_at), error)
            .await?;
        Ok(FailOutcome::Retrying { run_at })
    }

    /// Requeue jobs a previous process left mid-flight.
    pub async fn recover_interrupted(&self) -> Result<u64> {
        let count = self.repo.reset_processing().await?;
        if count > 0 {
            info!(count, "Requeued interrupted jobs");
            self.notify.notify_waiters();
        }
        Ok(count)
    }

    pub async fn count_active(&self, kind: JobKind) -> Result<i64> {
        self.repo.count_active(kind).await
    }

    pub async fn prune_finished_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let count = self.repo.delete_finished_before(datetime_to_ms(cutoff)).await?;
        if count > 0 {
            debug!(count, "Pruned finished jobs");
        }
        Ok(count)
    }

    pub fn repository(&self) -> &Arc<dyn JobRepository> {
        &self.repo
    }
}

pub fn release_inserted_key(release_id: &str) -> String {
    format!("release-inserted:{release_id}")
}

pub fn release_notification_key(release_id: &str, user_id: &str) -> String {
    format!("release-notification:{release_id}:{user_id}")
}

#[async_trait]
impl ReleasePublisher for JobQueue {
    async fn publish_inserted(&self, release: &InsertedRelease) -> Result<()> {
        let mut options = self.options_for(JobKind::ReleaseInserted);
        if let Some(id) = &release.release_id {
            options = options.with_dedupe_key(release_inserted_key(id));
        }
        self.enqueue(JobKind::ReleaseInserted, release, options)
            .await?;
        Ok(())
    }
}
