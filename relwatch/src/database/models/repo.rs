//! Repository rows.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::now_ms;

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct RepoDbModel {
    pub id: String,
    /// Upstream numeric id. Immutable once stored.
    pub github_id: i64,
    /// Lowercased owner.
    pub owner: String,
    /// Lowercased repository name.
    pub repo_name: String,
    /// Epoch ms of the last scheduler pass over this repository.
    pub last_release_check: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl RepoDbModel {
    /// Candidate row for an upsert. A new row has never been checked, so it
    /// sorts ahead of every checked repository.
    pub fn new(github_id: i64, owner: impl AsRef<str>, repo_name: impl AsRef<str>) -> Self {
        let now = now_ms();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            github_id,
            owner: owner.as_ref().to_lowercase(),
            repo_name: repo_name.as_ref().to_lowercase(),
            last_release_check: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
