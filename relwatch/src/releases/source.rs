//! The upstream query: GitHub's REST API.

use async_trait::async_trait;
use github_api::{GithubClient, ReleasePayload, RepoSlug};
use tracing::{debug, instrument};

use super::{GithubRepo, ListReleasesOptions, Release, ReleaseQuery};
use crate::Result;

pub const RELEASES_PAGE_SIZE: u32 = 10;
pub const MAX_RELEASE_PAGES: u32 = 20;
pub const NO_RELEASE_NAME: &str = "< No Release Name >";
pub const NO_RELEASE_BODY: &str = "< No Body Text >";

pub struct GithubRepoQuery {
    client: GithubClient,
    slug: RepoSlug,
}

impl GithubRepoQuery {
    pub fn new(client: GithubClient, slug: RepoSlug) -> Self {
        Self { client, slug }
    }
}

#[async_trait]
impl ReleaseQuery for GithubRepoQuery {
    #[instrument(skip(self), fields(repo = %self.slug))]
    async fn get_repo(&self) -> Result<GithubRepo> {
        let payload = self.client.get_repo(&self.slug).await?;
        Ok(GithubRepo {
            id: None,
            owner: self.slug.owner.clone(),
            name: self.slug.name.clone(),
            github_id: payload.id,
            last_release_check: None,
        })
    }

    /// Walk pages newest first until the first stable release.
    ///
    /// Prereleases seen before it are kept only when asked for. Drafts are
    /// never returned.
    #[instrument(skip(self), fields(repo = %self.slug))]
    async fn list_releases(&self, options: ListReleasesOptions) -> Result<Vec<Release>> {
        let mut collected = Vec::new();

        for page in 1..=MAX_RELEASE_PAGES {
            let payloads = self
                .client
                .list_releases(&self.slug, page, RELEASES_PAGE_SIZE)
                .await?;
            if payloads.is_empty() {
                break;
            }

            for payload in payloads.into_iter().filter(|p| !p.draft) {
                if payload.prerelease {
                    if options.include_prereleases {
                        collected.push(to_release(payload));
                    }
                    continue;
                }
                collected.push(to_release(payload));
                return Ok(collected);
            }
        }

        debug!(count = collected.len(), "No stable release found");
        Ok(collected)
    }
}

fn to_release(payload: ReleasePayload) -> Release {
    Release {
        id: None,
        repo_id: None,
        github_id: payload.id,
        name: payload
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| NO_RELEASE_NAME.to_string()),
        tag_name: payload.tag_name,
        prerelease: payload.prerelease,
        created_at: payload.created_at,
        body: payload
            .body
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| NO_RELEASE_BODY.to_string()),
        url: payload.html_url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use github_api::{GithubClientConfig, GithubError};
    use serde_json::{Value, json};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload(id: i64, prerelease: bool) -> Value {
        let name = if id % 2 == 0 {
            Value::Null
        } else {
            json!(format!("Release {id}"))
        };
        json!({
            "id": id,
            "tag_name": format!("v{id}"),
            "name": name,
            "prerelease": prerelease,
            "draft": false,
            "created_at": "2024-05-01T10:00:00Z",
            "body": null,
            "html_url": format!("https://github.com/acme/widget/releases/tag/v{id}")
        })
    }

    async fn query_for(server: &MockServer) -> GithubRepoQuery {
        let client = GithubClient::new(GithubClientConfig {
            base_url: server.uri(),
            ..Default::default()
        })
        .unwrap();
        GithubRepoQuery::new(client, RepoSlug::new("acme", "widget"))
    }

    async fn mount_page(server: &MockServer, page: u32, body: Value) {
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/releases"))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn stops_at_first_stable_release() {
        let server = MockServer::start().await;
        mount_page(&server, 1, json!([payload(5, true), payload(4, true)])).await;
        mount_page(&server, 2, json!([payload(3, true), payload(2, false), payload(1, false)])).await;

        let query = query_for(&server).await;

        let stable = query.list_releases(ListReleasesOptions::default()).await.unwrap();
        assert_eq!(stable.len(), 1);
        assert_eq!(stable[0].github_id, 2);
        assert_eq!(stable[0].name, NO_RELEASE_NAME);
        assert_eq!(stable[0].body, NO_RELEASE_BODY);

        let all = query
            .list_releases(ListReleasesOptions::with_prereleases())
            .await
            .unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.github_id).collect();
        assert_eq!(ids, vec![5, 4, 3, 2]);
        assert_eq!(all[0].name, "Release 5");
    }

    #[tokio::test]
    async fn empty_page_ends_the_walk() {
        let server = MockServer::start().await;
        mount_page(&server, 1, json!([payload(3, true)])).await;
        mount_page(&server, 2, json!([])).await;

        let releases = query_for(&server)
            .await
            .list_releases(ListReleasesOptions::default())
            .await
            .unwrap();
        assert!(releases.is_empty());
    }

    #[tokio::test]
    async fn page_ceiling_bounds_the_walk() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/releases"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([payload(9, true)])))
            .expect(u64::from(MAX_RELEASE_PAGES))
            .mount(&server)
            .await;

        let releases = query_for(&server)
            .await
            .list_releases(ListReleasesOptions::default())
            .await
            .unwrap();
        assert!(releases.is_empty());
        server.verify().await;
    }

    #[tokio::test]
    async fn rate_limit_surfaces_with_reset_time() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-ratelimit-remaining", "0")
                    .insert_header("x-ratelimit-reset", "1700000000"),
            )
            .mount(&server)
            .await;

        let err = query_for(&server).await.get_repo().await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Github(GithubError::RateLimitExceeded { .. })
        ));
        assert!(err.rate_limit_reset().is_some());
    }

    #[tokio::test]
    async fn get_repo_uses_slug_and_upstream_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 42,
                "name": "Widget",
                "full_name": "Acme/Widget",
                "html_url": "https://github.com/Acme/Widget"
            })))
            .mount(&server)
            .await;

        let repo = query_for(&server).await.get_repo().await.unwrap();
        assert_eq!(repo.github_id, 42);
        assert_eq!(repo.full_name(), "acme/widget");
        assert!(repo.id.is_none());
    }
}
