//! Application-wide error types.

use chrono::{DateTime, Utc};
use github_api::GithubError;
use thiserror::Error;

use crate::notification::MailError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("GitHub error: {0}")]
    Github(#[from] GithubError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Persistence conflict: {0}")]
    PersistenceConflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Reset time when this is an upstream rate-limit failure.
    ///
    /// The scheduler halts its run on `Some`, everything else is an ordinary
    /// per-repository failure.
    pub fn rate_limit_reset(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Github(err) => err.rate_limit_reset(),
            _ => None,
        }
    }

    /// True for unique/primary key violations raised by SQLite.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::DatabaseSqlx(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            Self::PersistenceConflict(_) => true,
            _ => false,
        }
    }
}
