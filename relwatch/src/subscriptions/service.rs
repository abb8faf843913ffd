//! Follow, unfollow and browse repositories on behalf of a user.
//!
//! Every upstream call is made with the user's own access key through the
//! full cache pipeline, so browsing also feeds the release cache.

use std::sync::Arc;

use github_api::{GithubClient, RepoSearchItem};
use serde::Serialize;
use tracing::{debug, warn};

use crate::database::models::SubscriptionSummary;
use crate::database::repositories::{SubscriptionRepository, UserRepository};
use crate::database::time::now_ms;
use crate::releases::{
    CacheContext, ListReleasesOptions, Release, ReleaseQuery, ReleaseQueryBuilder,
};
use crate::{Error, Result};

pub const FETCH_REPOSITORY_FAILED: &str = "Error Fetching Repository";
pub const CREATE_SUBSCRIPTION_FAILED: &str = "Error Creating Subscription";
pub const REMOVE_SUBSCRIPTION_FAILED: &str = "Error Removing Subscription";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationError {
    pub message: String,
}

/// Result envelope for mutations: failures are reported, not raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationOutcome {
    pub success: bool,
    pub error: Option<OperationError>,
}

impl OperationOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(OperationError {
                message: message.into(),
            }),
        }
    }
}

pub struct SubscriptionService {
    context: Arc<CacheContext>,
    users: Arc<dyn UserRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    search_client: GithubClient,
}

impl SubscriptionService {
    pub fn new(
        context: Arc<CacheContext>,
        users: Arc<dyn UserRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        search_client: GithubClient,
    ) -> Self {
        Self {
            context,
            users,
            subscriptions,
            search_client,
        }
    }

    pub async fn follow(&self, user_id: &str, repo_url: &str) -> OperationOutcome {
        let repo_id = match self.resolve_repo(user_id, repo_url).await {
            Ok(id) => id,
            Err(e) => {
                warn!(user_id, repo_url, error = %e, "Failed to fetch repository to follow");
                return OperationOutcome::failure(FETCH_REPOSITORY_FAILED);
            }
        };

        match self.subscriptions.subscribe(user_id, &repo_id).await {
            Ok(subscription) => {
                debug!(
                    user_id,
                    repo_id = %repo_id,
                    new = subscription.inserted,
                    "Repository followed"
                );
                OperationOutcome::ok()
            }
            Err(e) => {
                warn!(user_id, repo_id = %repo_id, error = %e, "Failed to create subscription");
                OperationOutcome::failure(CREATE_SUBSCRIPTION_FAILED)
            }
        }
    }

    /// Unfollowing a repository the user does not follow still succeeds.
    pub async fn unfollow(&self, user_id: &str, repo_url: &str) -> OperationOutcome {
        let repo_id = match self.resolve_repo(user_id, repo_url).await {
            Ok(id) => id,
            Err(e) => {
                warn!(user_id, repo_url, error = %e, "Failed to fetch repository to unfollow");
                return OperationOutcome::failure(FETCH_REPOSITORY_FAILED);
            }
        };

        match self.subscriptions.unsubscribe(user_id, &repo_id).await {
            Ok(removed) => {
                debug!(user_id, repo_id = %repo_id, removed, "Repository unfollowed");
                OperationOutcome::ok()
            }
            Err(e) => {
                warn!(user_id, repo_id = %repo_id, error = %e, "Failed to remove subscription");
                OperationOutcome::failure(REMOVE_SUBSCRIPTION_FAILED)
            }
        }
    }

    pub async fn list_subscriptions(&self, user_id: &str) -> Result<Vec<SubscriptionSummary>> {
        self.subscriptions.list_for_user(user_id).await
    }

    /// Releases through the full pipeline. With `mark_viewed`, a returned
    /// stable release clears the user's update flag for the repository.
    pub async fn list_releases(
        &self,
        user_id: &str,
        repo_url: &str,
        include_prereleases: bool,
        mark_viewed: bool,
    ) -> Result<Vec<Release>> {
        let query = self.query_for(user_id, repo_url).await?;
        let releases = query
            .list_releases(ListReleasesOptions {
                include_prereleases,
            })
            .await?;

        if mark_viewed {
            let viewed_repo = releases
                .iter()
                .filter(|r| !r.prerelease)
                .find_map(|r| r.repo_id.as_deref());
            if let Some(repo_id) = viewed_repo {
                self.subscriptions
                    .mark_viewed(user_id, repo_id, now_ms())
                    .await?;
            }
        }

        Ok(releases)
    }

    pub async fn search(&self, user_id: &str, query: &str) -> Result<Vec<RepoSearchItem>> {
        let key = self.users.get_access_key(user_id).await?;
        let items = self
            .search_client
            .with_token(key)
            .search_repositories(query)
            .await?;
        Ok(items)
    }

    async fn query_for(&self, user_id: &str, repo_url: &str) -> Result<Arc<dyn ReleaseQuery>> {
        let key = self.users.get_access_key(user_id).await?;
        ReleaseQueryBuilder::full_cache(self.context.clone(), repo_url)
            .with_access_key(key)
            .build()
    }

    /// Local id of the repository, persisting it first if needed.
    async fn resolve_repo(&self, user_id: &str, repo_url: &str) -> Result<String> {
        let repo = self.query_for(user_id, repo_url).await?.get_repo().await?;
        let full_name = repo.full_name();
        repo.id
            .ok_or_else(|| Error::Other(format!("{full_name} was not persisted")))
    }
}
