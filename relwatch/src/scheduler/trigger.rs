//! Cron-driven producer of `CHECK_RELEASES` jobs.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::database::models::JobKind;
use crate::queue::{EnqueueOutcome, JobQueue};

/// Finished jobs older than this are deleted on every tick.
pub const JOB_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

pub struct PeriodicTrigger {
    queue: Arc<JobQueue>,
    schedule: Schedule,
    retention: Duration,
}

impl PeriodicTrigger {
    pub fn new(queue: Arc<JobQueue>, schedule: Schedule) -> Self {
        Self {
            queue,
            schedule,
            retention: JOB_RETENTION,
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// One firing: enqueue a check unless one is already pending or running,
    /// then drop expired finished jobs. Returns whether a job was enqueued.
    pub async fn tick(&self) -> Result<bool> {
        let enqueued = if self.queue.count_active(JobKind::CheckReleases).await? > 0 {
            debug!("Release check still queued or running, not enqueueing another");
            false
        } else {
            let options = self.queue.options_for(JobKind::CheckReleases);
            let payload = json!({ "triggered_at": Utc::now() });
            matches!(
                self.queue
                    .enqueue(JobKind::CheckReleases, &payload, options)
                    .await?,
                EnqueueOutcome::Enqueued(_)
            )
        };

        let retention = chrono::Duration::from_std(self.retention)
            .unwrap_or_else(|_| chrono::Duration::days(30));
        self.queue
            .prune_finished_before(Utc::now() - retention)
            .await?;

        Ok(enqueued)
    }

    /// Fire on every schedule occurrence until cancelled.
    pub async fn run(self, cancellation_token: CancellationToken) {
        info!("Release check trigger started");
        loop {
            let Some(next) = self.schedule.upcoming(Utc).next() else {
                warn!("Cron schedule has no upcoming occurrence, trigger stopping");
                break;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            debug!(next = %next, "Next release check scheduled");

            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    debug!("Release check trigger shutting down");
                    break;
                }
                _ = tokio::time::sleep(wait) => {
                    if let Err(e) = self.tick().await {
                        error!("Release check trigger tick failed: {}", e);
                    }
                }
            }
        }
        info!("Release check trigger stopped");
    }

    pub fn start(self, cancellation_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancellation_token))
    }
}
