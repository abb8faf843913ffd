//! Release rows.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ReleaseDbModel {
    pub id: String,
    pub repo_id: String,
    pub github_id: i64,
    pub release_name: String,
    pub tag_name: String,
    pub prerelease: bool,
    /// Upstream creation time, epoch ms.
    pub release_created_at: i64,
    pub body: String,
    pub url: String,
    pub created_at: i64,
    pub updated_at: i64,
}
