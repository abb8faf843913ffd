//! Subscription persistence.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{SubscriberContact, SubscriptionDbModel, SubscriptionSummary};
use crate::database::repositories::Upserted;
use crate::database::time::now_ms;
use crate::{Error, Result};

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Create the `(user, repo)` link if missing. Last-viewed starts at epoch.
    async fn subscribe(&self, user_id: &str, repo_id: &str) -> Result<Upserted<SubscriptionDbModel>>;

    /// Returns false when there was nothing to delete.
    async fn unsubscribe(&self, user_id: &str, repo_id: &str) -> Result<bool>;

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<SubscriptionSummary>>;

    /// Every user subscribed to the repository, with whatever email they have.
    async fn subscribers_for_repo(&self, repo_id: &str) -> Result<Vec<SubscriberContact>>;

    /// Flag every subscription on the repository as having an unseen update.
    async fn mark_repo_updated(&self, repo_id: &str) -> Result<u64>;

    /// Clear the update flag and stamp last-viewed.
    async fn mark_viewed(&self, user_id: &str, repo_id: &str, viewed_at_ms: i64) -> Result<bool>;
}

pub struct SqlxSubscriptionRepository {
    pool: SqlitePool,
}

impl SqlxSubscriptionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionRepository for SqlxSubscriptionRepository {
    async fn subscribe(&self, user_id: &str, repo_id: &str) -> Result<Upserted<SubscriptionDbModel>> {
        let candidate = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO app_user_repo_subscriptions (
                id, user_id, repo_id, has_updated, last_viewed_at, created_at
            ) VALUES (?, ?, ?, 0, 0, ?)
            ON CONFLICT (user_id, repo_id) DO NOTHING
            "#,
        )
        .bind(&candidate)
        .bind(user_id)
        .bind(repo_id)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, SubscriptionDbModel>(
            "SELECT * FROM app_user_repo_subscriptions WHERE user_id = ? AND repo_id = ?",
        )
        .bind(user_id)
        .bind(repo_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("subscription", format!("{user_id}/{repo_id}")))?;

        let inserted = row.id == candidate;
        Ok(Upserted { row, inserted })
    }

    async fn unsubscribe(&self, user_id: &str, repo_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM app_user_repo_subscriptions WHERE user_id = ? AND repo_id = ?",
        )
        .bind(user_id)
        .bind(repo_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<SubscriptionSummary>> {
        let rows = sqlx::query_as::<_, SubscriptionSummary>(
            r#"
            SELECT s.id AS subscription_id, s.has_updated, r.owner, r.repo_name
            FROM app_user_repo_subscriptions s
            JOIN repos r ON r.id = s.repo_id
            WHERE s.user_id = ?
            ORDER BY r.owner, r.repo_name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn subscribers_for_repo(&self, repo_id: &str) -> Result<Vec<SubscriberContact>> {
        let rows = sqlx::query_as::<_, SubscriberContact>(
            r#"
            SELECT u.id AS user_id, u.username, u.email
            FROM app_user_repo_subscriptions s
            JOIN app_users u ON u.id = s.user_id
            WHERE s.repo_id = ?
            ORDER BY u.username
            "#,
        )
        .bind(repo_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn mark_repo_updated(&self, repo_id: &str) -> Result<u64> {
        let result =
            sqlx::query("UPDATE app_user_repo_subscriptions SET has_updated = 1 WHERE repo_id = ?")
                .bind(repo_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn mark_viewed(&self, user_id: &str, repo_id: &str, viewed_at_ms: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE app_user_repo_subscriptions
            SET has_updated = 0, last_viewed_at = ?
            WHERE user_id = ? AND repo_id = ?
            "#,
        )
        .bind(viewed_at_ms)
        .bind(user_id)
        .bind(repo_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
