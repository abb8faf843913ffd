//! Job queue rows.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::now_ms;

/// Job database model.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JobDbModel {
    pub id: String,
    /// CHECK_RELEASES, RELEASE_INSERTED, RELEASE_NOTIFICATION
    pub kind: String,
    /// JSON payload, shape depends on `kind`.
    pub payload: String,
    /// PENDING, PROCESSING, COMPLETED, FAILED
    pub status: String,
    pub attempts: i64,
    pub max_attempts: i64,
    /// Base delay for exponential retry backoff.
    pub backoff_ms: i64,
    /// Not claimable before this epoch ms.
    pub run_at: i64,
    pub last_error: Option<String>,
    /// Unique among all rows when set.
    pub dedupe_key: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl JobDbModel {
    pub fn new(kind: JobKind, payload: impl Into<String>, max_attempts: u32, backoff_ms: i64) -> Self {
        let now = now_ms();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: kind.as_str().to_string(),
            payload: payload.into(),
            status: JobStatus::Pending.as_str().to_string(),
            attempts: 0,
            max_attempts: i64::from(max_attempts.max(1)),
            backoff_ms,
            run_at: now,
            last_error: None,
            dedupe_key: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_dedupe_key(mut self, key: impl Into<String>) -> Self {
        self.dedupe_key = Some(key.into());
        self
    }

    pub fn job_kind(&self) -> Option<JobKind> {
        JobKind::parse(&self.kind)
    }
}

/// Job kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    /// Periodic scheduler run.
    CheckReleases,
    /// Fan-out for a newly inserted release.
    ReleaseInserted,
    /// One email to one subscriber.
    ReleaseNotification,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckReleases => "CHECK_RELEASES",
            Self::ReleaseInserted => "RELEASE_INSERTED",
            Self::ReleaseNotification => "RELEASE_NOTIFICATION",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CHECK_RELEASES" => Some(Self::CheckReleases),
            "RELEASE_INSERTED" => Some(Self::ReleaseInserted),
            "RELEASE_NOTIFICATION" => Some(Self::ReleaseNotification),
            _ => None,
        }
    }
}

/// Job status values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting for `run_at`, then for a worker.
    Pending,
    /// Claimed by a worker.
    Processing,
    Completed,
    /// Attempts exhausted.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "PROCESSING" => Some(Self::Processing),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}
