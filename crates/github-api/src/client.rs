//! HTTP client for the GitHub REST API.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::models::{ReleasePayload, RepoPayload, RepoSearchItem, SearchResponse};
use crate::{GithubError, RateLimit, RepoSlug, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const SEARCH_PAGE_SIZE: u32 = 10;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct GithubClientConfig {
    /// API root, e.g. `https://api.github.com`.
    pub base_url: String,
    /// Access token sent as a bearer credential. Raises the quota when present.
    pub token: Option<String>,
    /// Whole-request timeout. Zero disables it.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for GithubClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            timeout: Duration::from_secs(30),
            user_agent: concat!("relwatch/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(config: GithubClientConfig) -> Result<Self> {
        url::Url::parse(&config.base_url)
            .map_err(|e| GithubError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;

        let mut builder = reqwest::Client::builder().user_agent(config.user_agent);
        if config.timeout > Duration::ZERO {
            builder = builder.timeout(config.timeout);
        }

        Ok(Self {
            http: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: normalize_token(config.token),
        })
    }

    /// Same client, different credential. An empty token means anonymous.
    pub fn with_token(&self, token: Option<String>) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            token: normalize_token(token),
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub async fn get_repo(&self, slug: &RepoSlug) -> Result<RepoPayload> {
        let endpoint = format!("/repos/{}/{}", slug.owner, slug.name);
        self.get_json(&endpoint, &[]).await
    }

    /// One page of releases, newest first. Pages are 1-based.
    pub async fn list_releases(
        &self,
        slug: &RepoSlug,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<ReleasePayload>> {
        let endpoint = format!("/repos/{}/{}/releases", slug.owner, slug.name);
        self.get_json(
            &endpoint,
            &[("page", page.to_string()), ("per_page", per_page.to_string())],
        )
        .await
    }

    /// First page of repositories matching `query`, most starred first.
    pub async fn search_repositories(&self, query: &str) -> Result<Vec<RepoSearchItem>> {
        let response: SearchResponse = self
            .get_json(
                "/search/repositories",
                &[
                    ("q", query.to_string()),
                    ("sort", "stars".to_string()),
                    ("page", "1".to_string()),
                    ("per_page", SEARCH_PAGE_SIZE.to_string()),
                ],
            )
            .await?;
        Ok(response.items.into_iter().map(Into::into).collect())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, endpoint);
        trace!(url = %url, "GitHub request");

        let mut request = self
            .http
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        // Checked before the status: a spent quota wins over whatever else the
        // response says.
        RateLimit::from_headers(response.headers()).check(endpoint)?;

        if status.is_success() {
            let body = response.bytes().await?;
            return Ok(serde_json::from_slice(&body)?);
        }

        let message = response.text().await.unwrap_or_default();
        debug!(endpoint = %endpoint, status = %status, "GitHub request failed");

        Err(match status {
            StatusCode::NOT_FOUND => GithubError::NotFound(endpoint.to_string()),
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => GithubError::Forbidden(message),
            _ => GithubError::Status {
                status: status.as_u16(),
                endpoint: endpoint.to_string(),
                message,
            },
        })
    }
}

fn normalize_token(token: Option<String>) -> Option<String> {
    token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GithubClient {
        GithubClient::new(GithubClientConfig {
            base_url: server.uri(),
            ..Default::default()
        })
        .unwrap()
    }

    fn widget() -> RepoSlug {
        RepoSlug::new("acme", "widget")
    }

    #[tokio::test]
    async fn get_repo_parses_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-ratelimit-remaining", "4999")
                    .insert_header("x-ratelimit-reset", "1700000000")
                    .set_body_json(json!({
                        "id": 42,
                        "name": "widget",
                        "full_name": "acme/widget",
                        "html_url": "https://github.com/acme/widget",
                        "private": false
                    })),
            )
            .mount(&server)
            .await;

        let repo = client_for(&server).get_repo(&widget()).await.unwrap();
        assert_eq!(repo.id, 42);
        assert_eq!(repo.full_name, "acme/widget");
    }

    #[tokio::test]
    async fn exhausted_quota_on_success_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-ratelimit-remaining", "0")
                    .insert_header("x-ratelimit-reset", "1700000000")
                    .set_body_json(json!({
                        "id": 42,
                        "name": "widget",
                        "full_name": "acme/widget",
                        "html_url": "https://github.com/acme/widget"
                    })),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).get_repo(&widget()).await.unwrap_err();
        assert_eq!(
            err.rate_limit_reset(),
            chrono::DateTime::from_timestamp(1_700_000_000, 0)
        );
    }

    #[tokio::test]
    async fn forbidden_with_spent_quota_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/releases"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-ratelimit-remaining", "0")
                    .insert_header("x-ratelimit-reset", "1700000600")
                    .set_body_string("API rate limit exceeded"),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .list_releases(&widget(), 1, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, GithubError::RateLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn forbidden_without_spent_quota_is_forbidden() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-ratelimit-remaining", "12")
                    .set_body_string("Resource not accessible"),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).get_repo(&widget()).await.unwrap_err();
        assert!(matches!(err, GithubError::Forbidden(_)));
        assert!(err.rate_limit_reset().is_none());
    }

    #[tokio::test]
    async fn missing_repository_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client_for(&server).get_repo(&widget()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn list_releases_sends_paging_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widget/releases"))
            .and(query_param("page", "2"))
            .and(query_param("per_page", "10"))
            .and(header("authorization", "Bearer secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "id": 7,
                    "tag_name": "v1.2.0",
                    "name": null,
                    "prerelease": false,
                    "created_at": "2024-05-01T10:00:00Z",
                    "body": null,
                    "html_url": "https://github.com/acme/widget/releases/tag/v1.2.0"
                }
            ])))
            .mount(&server)
            .await;

        let client = client_for(&server).with_token(Some("secret-token".to_string()));
        let releases = client.list_releases(&widget(), 2, 10).await.unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].tag_name, "v1.2.0");
        assert!(releases[0].name.is_none());
    }

    #[tokio::test]
    async fn search_maps_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .and(query_param("q", "widget"))
            .and(query_param("sort", "stars"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_count": 1,
                "items": [{
                    "id": 42,
                    "name": "widget",
                    "description": "Widgets for everyone",
                    "html_url": "https://github.com/acme/widget",
                    "private": false
                }]
            })))
            .mount(&server)
            .await;

        let items = client_for(&server)
            .search_repositories("widget")
            .await
            .unwrap();
        assert_eq!(
            items,
            vec![RepoSearchItem {
                url: "https://github.com/acme/widget".to_string(),
                name: "widget".to_string(),
                description: Some("Widgets for everyone".to_string()),
                id: 42,
                private: false,
            }]
        );
    }

    #[test]
    fn blank_token_is_anonymous() {
        let client = GithubClient::new(GithubClientConfig::default()).unwrap();
        assert!(!client.with_token(Some("  ".to_string())).has_token());
        assert!(client.with_token(Some("abc".to_string())).has_token());
    }
}
