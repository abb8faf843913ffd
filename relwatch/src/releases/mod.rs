//! Release acquisition: the upstream query, its cache decorators and the
//! builder that composes them.
//!
//! Every layer implements [`ReleaseQuery`] for a single repository and holds
//! the next layer as `Arc<dyn ReleaseQuery>`:
//!
//! ```text
//! ReadCacheQuery -> WriteCacheQuery -> GithubRepoQuery
//! ```

pub mod builder;
pub mod read_cache;
pub mod source;
pub mod write_cache;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use github_api::{GithubClient, RepoSlug};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::database::models::{ReleaseDbModel, RepoDbModel};
use crate::database::time::{datetime_to_ms, ms_to_datetime, now_ms};

pub use builder::{CacheContext, ReleaseQueryBuilder};
pub use read_cache::ReadCacheQuery;
pub use source::GithubRepoQuery;
pub use write_cache::WriteCacheQuery;

/// A repository as seen by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubRepo {
    /// Local storage id; `None` until persisted.
    pub id: Option<String>,
    pub owner: String,
    pub name: String,
    pub github_id: i64,
    pub last_release_check: Option<DateTime<Utc>>,
}

impl GithubRepo {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl From<RepoDbModel> for GithubRepo {
    fn from(row: RepoDbModel) -> Self {
        Self {
            id: Some(row.id),
            owner: row.owner,
            name: row.repo_name,
            github_id: row.github_id,
            last_release_check: Some(ms_to_datetime(row.last_release_check)),
        }
    }
}

/// A release as seen by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Local storage id; `None` until persisted.
    pub id: Option<String>,
    pub repo_id: Option<String>,
    pub github_id: i64,
    pub name: String,
    pub tag_name: String,
    pub prerelease: bool,
    /// Upstream creation time.
    pub created_at: DateTime<Utc>,
    pub body: String,
    pub url: String,
}

impl Release {
    /// Candidate row for an upsert under `repo_id`.
    pub fn to_db_model(&self, repo_id: &str) -> ReleaseDbModel {
        let now = now_ms();
        ReleaseDbModel {
            id: uuid::Uuid::new_v4().to_string(),
            repo_id: repo_id.to_string(),
            github_id: self.github_id,
            release_name: self.name.clone(),
            tag_name: self.tag_name.clone(),
            prerelease: self.prerelease,
            release_created_at: datetime_to_ms(self.created_at),
            body: self.body.clone(),
            url: self.url.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl From<ReleaseDbModel> for Release {
    fn from(row: ReleaseDbModel) -> Self {
        Self {
            id: Some(row.id),
            repo_id: Some(row.repo_id),
            github_id: row.github_id,
            name: row.release_name,
            tag_name: row.tag_name,
            prerelease: row.prerelease,
            created_at: ms_to_datetime(row.release_created_at),
            body: row.body,
            url: row.url,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListReleasesOptions {
    pub include_prereleases: bool,
}

impl ListReleasesOptions {
    pub fn with_prereleases() -> Self {
        Self {
            include_prereleases: true,
        }
    }
}

/// Release lookup for one repository.
#[async_trait]
pub trait ReleaseQuery: Send + Sync {
    async fn get_repo(&self) -> Result<GithubRepo>;

    /// Releases newest first. Without prereleases this is at most the single
    /// newest stable release.
    async fn list_releases(&self, options: ListReleasesOptions) -> Result<Vec<Release>>;
}

/// Payload announced for every first-time release insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertedRelease {
    pub release_id: Option<String>,
    pub repo_id: Option<String>,
    pub repo_full_name: String,
    pub release_name: String,
    pub tag_name: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl InsertedRelease {
    pub fn new(repo: &GithubRepo, release: &Release) -> Self {
        Self {
            release_id: release.id.clone(),
            repo_id: release.repo_id.clone().or_else(|| repo.id.clone()),
            repo_full_name: repo.full_name(),
            release_name: release.name.clone(),
            tag_name: release.tag_name.clone(),
            url: release.url.clone(),
            created_at: release.created_at,
        }
    }
}

/// Sink for newly inserted releases.
#[async_trait]
pub trait ReleasePublisher: Send + Sync {
    async fn publish_inserted(&self, release: &InsertedRelease) -> Result<()>;
}

/// Produces the upstream query for a repository.
pub trait SourceFactory: Send + Sync {
    fn source_for(&self, slug: &RepoSlug, access_key: Option<&str>) -> Arc<dyn ReleaseQuery>;
}

/// Default factory: the GitHub REST API, authenticated with the caller's key
/// when one is given.
pub struct GithubSourceFactory {
    client: GithubClient,
}

impl GithubSourceFactory {
    pub fn new(client: GithubClient) -> Self {
        Self { client }
    }
}

impl SourceFactory for GithubSourceFactory {
    fn source_for(&self, slug: &RepoSlug, access_key: Option<&str>) -> Arc<dyn ReleaseQuery> {
        let client = match access_key {
            Some(key) => self.client.with_token(Some(key.to_string())),
            None => self.client.clone(),
        };
        Arc::new(GithubRepoQuery::new(client, slug.clone()))
    }
}
