//! Write-through decorator: persist whatever the wrapped query returns and
//! announce releases stored for the first time.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument, warn};

use super::{
    GithubRepo, InsertedRelease, ListReleasesOptions, Release, ReleasePublisher, ReleaseQuery,
};
use crate::database::models::RepoDbModel;
use crate::database::repositories::{ReleaseRepository, RepoRepository};
use crate::{Error, Result};

pub struct WriteCacheQuery {
    inner: Arc<dyn ReleaseQuery>,
    repos: Arc<dyn RepoRepository>,
    releases: Arc<dyn ReleaseRepository>,
    publisher: Arc<dyn ReleasePublisher>,
}

impl WriteCacheQuery {
    pub fn new(
        inner: Arc<dyn ReleaseQuery>,
        repos: Arc<dyn RepoRepository>,
        releases: Arc<dyn ReleaseRepository>,
        publisher: Arc<dyn ReleasePublisher>,
    ) -> Self {
        Self {
            inner,
            repos,
            releases,
            publisher,
        }
    }

    async fn forget(&self, release: &Release) {
        let Some(id) = release.id.as_deref() else {
            return;
        };
        match self.releases.delete(id).await {
            Ok(_) => warn!(tag = %release.tag_name, "Announcement failed, release row removed"),
            Err(e) => error!(
                tag = %release.tag_name,
                error = %e,
                "Announcement failed and the release row could not be removed"
            ),
        }
    }
}

#[async_trait]
impl ReleaseQuery for WriteCacheQuery {
    async fn get_repo(&self) -> Result<GithubRepo> {
        let upstream = self.inner.get_repo().await?;
        let stored = self
            .repos
            .upsert(&RepoDbModel::new(
                upstream.github_id,
                &upstream.owner,
                &upstream.name,
            ))
            .await?;
        if stored.inserted {
            info!(repo = %upstream.full_name(), "Stored new repository");
        }
        Ok(stored.row.into())
    }

    #[instrument(skip(self))]
    async fn list_releases(&self, options: ListReleasesOptions) -> Result<Vec<Release>> {
        let repo = self.get_repo().await?;
        let repo_id = repo
            .id
            .clone()
            .ok_or_else(|| Error::Other(format!("{} was not persisted", repo.full_name())))?;

        let upstream = self.inner.list_releases(options).await?;
        if upstream.is_empty() {
            return Ok(Vec::new());
        }

        let mut persisted = Vec::with_capacity(upstream.len());
        for release in &upstream {
            let stored = self.releases.upsert(&release.to_db_model(&repo_id)).await?;
            let release = Release::from(stored.row);

            if stored.inserted {
                info!(
                    repo = %repo.full_name(),
                    tag = %release.tag_name,
                    "New release stored"
                );
                let announced = self
                    .publisher
                    .publish_inserted(&InsertedRelease::new(&repo, &release))
                    .await;
                if let Err(e) = announced {
                    // The row must not outlive a failed announcement, or the
                    // next pass would see it as known and never publish it.
                    self.forget(&release).await;
                    return Err(e);
                }
            } else {
                debug!(
                    repo = %repo.full_name(),
                    tag = %release.tag_name,
                    "Release already stored"
                );
            }
            persisted.push(release);
        }

        Ok(persisted)
    }
}
