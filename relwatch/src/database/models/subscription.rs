//! Subscription rows and the projections read from them.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct SubscriptionDbModel {
    pub id: String,
    pub user_id: String,
    pub repo_id: String,
    pub has_updated: bool,
    /// Epoch ms; zero until the user first views the repository's releases.
    pub last_viewed_at: i64,
    pub created_at: i64,
}

/// A subscriber of a repository, as seen by notification fan-out.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct SubscriberContact {
    pub user_id: String,
    pub username: String,
    pub email: Option<String>,
}

/// One row of a user's subscription list.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct SubscriptionSummary {
    pub subscription_id: String,
    pub has_updated: bool,
    pub owner: String,
    pub repo_name: String,
}
