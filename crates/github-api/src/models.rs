//! Wire shapes for the subset of the REST API in use.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `GET /repos/{owner}/{repo}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoPayload {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub html_url: String,
    #[serde(default)]
    pub private: bool,
}

/// One element of `GET /repos/{owner}/{repo}/releases`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleasePayload {
    pub id: i64,
    pub tag_name: String,
    pub name: Option<String>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub draft: bool,
    pub created_at: DateTime<Utc>,
    pub body: Option<String>,
    pub html_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SearchResponse {
    pub items: Vec<SearchItemPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SearchItemPayload {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub private: bool,
}

/// Repository search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSearchItem {
    pub url: String,
    pub name: String,
    pub description: Option<String>,
    pub id: i64,
    pub private: bool,
}

impl From<SearchItemPayload> for RepoSearchItem {
    fn from(item: SearchItemPayload) -> Self {
        Self {
            url: item.html_url,
            name: item.name,
            description: item.description,
            id: item.id,
            private: item.private,
        }
    }
}
