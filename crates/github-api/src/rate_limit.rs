//! Interpretation of the `x-ratelimit-*` response headers.

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use tracing::warn;

use crate::GithubError;

pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Remaining quota below this is logged but still served.
pub const LOW_QUOTA_THRESHOLD: u32 = 10;

/// Rate-limit state reported alongside a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateLimit {
    pub remaining: Option<u32>,
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimit {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
        };

        let remaining = header(REMAINING_HEADER).and_then(|v| v.parse::<u32>().ok());
        let reset_at = header(RESET_HEADER)
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        Self {
            remaining,
            reset_at,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    pub fn is_low(&self) -> bool {
        matches!(self.remaining, Some(n) if n > 0 && n < LOW_QUOTA_THRESHOLD)
    }

    /// Fail with [`GithubError::RateLimitExceeded`] when the quota is spent.
    ///
    /// A missing reset header on an exhausted quota falls back to "now", which
    /// still halts the caller but lets the next scheduled attempt go ahead.
    pub fn check(&self, endpoint: &str) -> Result<(), GithubError> {
        if self.is_exhausted() {
            let reset_at = self.reset_at.unwrap_or_else(Utc::now);
            warn!(
                endpoint = %endpoint,
                reset_at = %reset_at,
                "GitHub API rate limit exceeded"
            );
            return Err(GithubError::RateLimitExceeded { reset_at });
        }

        if self.is_low() {
            warn!(
                endpoint = %endpoint,
                remaining = self.remaining.unwrap_or_default(),
                "GitHub API rate limit running low"
            );
        }

        Ok(())
    }
}
