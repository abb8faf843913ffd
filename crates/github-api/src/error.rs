use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GithubError {
    /// The remaining quota reported by the API is zero.
    #[error("github rate limit exceeded, quota resets at {reset_at}")]
    RateLimitExceeded { reset_at: DateTime<Utc> },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("unexpected status {status} from {endpoint}: {message}")]
    Status {
        status: u16,
        endpoint: String,
        message: String,
    },
    #[error("invalid repository url: {0}")]
    InvalidUrl(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GithubError {
    /// Reset time when this error is a rate-limit condition.
    pub fn rate_limit_reset(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::RateLimitExceeded { reset_at } => Some(*reset_at),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
