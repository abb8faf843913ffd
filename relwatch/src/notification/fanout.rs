//! `RELEASE_INSERTED` jobs: one notification job per reachable subscriber.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::email::ReleaseNotification;
use crate::Result;
use crate::database::models::JobKind;
use crate::database::repositories::SubscriptionRepository;
use crate::queue::{EnqueueOutcome, JobHandler, JobQueue, QueuedJob, release_notification_key};
use crate::releases::InsertedRelease;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub enqueued: usize,
    /// Already enqueued by an earlier attempt of the same fan-out.
    pub duplicates: usize,
    pub skipped_no_email: usize,
}

pub struct ReleaseFanout {
    subscriptions: Arc<dyn SubscriptionRepository>,
    queue: Arc<JobQueue>,
}

impl ReleaseFanout {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>, queue: Arc<JobQueue>) -> Self {
        Self {
            subscriptions,
            queue,
        }
    }

    /// Flag the repository as updated for its subscribers and enqueue their
    /// notifications. Never sends mail itself.
    pub async fn fan_out(&self, release: &InsertedRelease) -> Result<FanoutReport> {
        let (Some(release_id), Some(repo_id)) = (&release.release_id, &release.repo_id) else {
            info!(
                repo = %release.repo_full_name,
                release = %release.release_name,
                "Release has no local id, nothing to fan out"
            );
            return Ok(FanoutReport::default());
        };

        self.subscriptions.mark_repo_updated(repo_id).await?;

        let mut report = FanoutReport::default();
        for subscriber in self.subscriptions.subscribers_for_repo(repo_id).await? {
            let Some(to) = subscriber
                .email
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
            else {
                info!(
                    user = %subscriber.username,
                    repo = %release.repo_full_name,
                    "Subscriber has no email, skipping notification"
                );
                report.skipped_no_email += 1;
                continue;
            };

            let notification = ReleaseNotification {
                to: to.to_string(),
                user_id: subscriber.user_id.clone(),
                release_id: release_id.clone(),
                release_name: release.release_name.clone(),
                repo_full_name: release.repo_full_name.clone(),
                url: release.url.clone(),
            };
            let options = self
                .queue
                .options_for(JobKind::ReleaseNotification)
                .with_dedupe_key(release_notification_key(release_id, &subscriber.user_id));

            match self
                .queue
                .enqueue(JobKind::ReleaseNotification, &notification, options)
                .await?
            {
                EnqueueOutcome::Enqueued(_) => report.enqueued += 1,
                EnqueueOutcome::Duplicate => report.duplicates += 1,
            }
        }

        debug!(
            repo = %release.repo_full_name,
            release = %release.release_name,
            enqueued = report.enqueued,
            duplicates = report.duplicates,
            skipped = report.skipped_no_email,
            "Release fan-out finished"
        );
        Ok(report)
    }
}

#[async_trait]
impl JobHandler for ReleaseFanout {
    fn name(&self) -> &'static str {
        "release-fanout"
    }

    fn kinds(&self) -> &'static [JobKind] {
        &[JobKind::ReleaseInserted]
    }

    async fn handle(&self, job: &QueuedJob) -> Result<()> {
        let release: InsertedRelease = job.payload()?;
        self.fan_out(&release).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::RepoDbModel;
    use crate::database::repositories::{
        RepoRepository, SqlxJobRepository, SqlxRepoRepository, SqlxSubscriptionRepository,
        SqlxUserRepository, UserRepository,
    };
    use crate::database::test_pool;
    use chrono::Utc;

    struct Fixture {
        fanout: ReleaseFanout,
        queue: Arc<JobQueue>,
        subscriptions: Arc<SqlxSubscriptionRepository>,
        users: SqlxUserRepository,
        repo_id: String,
    }

    async fn fixture() -> Fixture {
        let pool = test_pool().await;
        let repos = SqlxRepoRepository::new(pool.clone());
        let repo_id = repos
            .upsert(&RepoDbModel::new(42, "acme", "widget"))
            .await
            .unwrap()
            .row
            .id;
        let subscriptions = Arc::new(SqlxSubscriptionRepository::new(pool.clone()));
        let queue = Arc::new(JobQueue::new(Arc::new(SqlxJobRepository::new(pool.clone()))));
        Fixture {
            fanout: ReleaseFanout::new(subscriptions.clone(), queue.clone()),
            queue,
            subscriptions,
            users: SqlxUserRepository::new(pool),
            repo_id,
        }
    }

    impl Fixture {
        async fn subscribe(&self, username: &str, email: Option<&str>) -> String {
            let user = self
                .users
                .upsert_by_username(username, email, None)
                .await
                .unwrap();
            self.subscriptions
                .subscribe(&user.id, &self.repo_id)
                .await
                .unwrap();
            user.id
        }

        fn release(&self, release_id: Option<&str>) -> InsertedRelease {
            InsertedRelease {
                release_id: release_id.map(str::to_string),
                repo_id: Some(self.repo_id.clone()),
                repo_full_name: "acme/widget".to_string(),
                release_name: "v1.0.0".to_string(),
                tag_name: "v1.0.0".to_string(),
                url: "https://github.com/acme/widget/releases/tag/v1.0.0".to_string(),
                created_at: Utc::now(),
            }
        }

        async fn notification_jobs(&self) -> i64 {
            self.queue
                .count_active(JobKind::ReleaseNotification)
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn one_job_per_subscriber_with_email() {
        let fx = fixture().await;
        fx.subscribe("octo", Some("octo@example.com")).await;
        fx.subscribe("hubot", Some("hubot@example.com")).await;

        let report = fx.fanout.fan_out(&fx.release(Some("rel-1"))).await.unwrap();
        assert_eq!(report.enqueued, 2);
        assert_eq!(fx.notification_jobs().await, 2);
    }

    #[tokio::test]
    async fn subscriber_without_email_is_skipped_not_failed() {
        let fx = fixture().await;
        let user_id = fx.subscribe("ghost", None).await;
        fx.subscribe("blank", Some("  ")).await;

        let report = fx.fanout.fan_out(&fx.release(Some("rel-1"))).await.unwrap();
        assert_eq!(report.enqueued, 0);
        assert_eq!(report.skipped_no_email, 2);
        assert_eq!(fx.notification_jobs().await, 0);

        // The update flag is set regardless of email.
        let subs = fx.subscriptions.list_for_user(&user_id).await.unwrap();
        assert!(subs[0].has_updated);
    }

    #[tokio::test]
    async fn rerun_does_not_duplicate_notifications() {
        let fx = fixture().await;
        fx.subscribe("octo", Some("octo@example.com")).await;
        let release = fx.release(Some("rel-1"));

        fx.fanout.fan_out(&release).await.unwrap();
        let again = fx.fanout.fan_out(&release).await.unwrap();
        assert_eq!(again.enqueued, 0);
        assert_eq!(again.duplicates, 1);
        assert_eq!(fx.notification_jobs().await, 1);
    }

    #[tokio::test]
    async fn release_without_local_id_is_a_clean_no_op() {
        let fx = fixture().await;
        let user_id = fx.subscribe("octo", Some("octo@example.com")).await;

        let report = fx.fanout.fan_out(&fx.release(None)).await.unwrap();
        assert_eq!(report, FanoutReport::default());
        assert_eq!(fx.notification_jobs().await, 0);
        let subs = fx.subscriptions.list_for_user(&user_id).await.unwrap();
        assert!(!subs[0].has_updated);
    }

    #[tokio::test]
    async fn handler_reads_job_payload() {
        let fx = fixture().await;
        fx.subscribe("octo", Some("octo@example.com")).await;
        fx.queue
            .enqueue(
                JobKind::ReleaseInserted,
                &fx.release(Some("rel-9")),
                fx.queue.options_for(JobKind::ReleaseInserted),
            )
            .await
            .unwrap();

        let job = fx
            .queue
            .claim_next(&[JobKind::ReleaseInserted])
            .await
            .unwrap()
            .unwrap();
        fx.fanout.handle(&job).await.unwrap();
        assert_eq!(fx.notification_jobs().await, 1);
    }
}
