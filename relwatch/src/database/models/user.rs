//! User rows.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UserDbModel {
    pub id: String,
    /// Upstream login, unique.
    pub username: String,
    pub email: Option<String>,
    /// Upstream OAuth token used for this user's API calls.
    #[serde(skip_serializing)]
    pub access_key: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}
