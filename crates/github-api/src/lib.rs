//! Minimal GitHub REST client used by the release watcher.
//!
//! Only the endpoints the release pipeline needs are covered: repository
//! lookup, paged release listing and repository search. Every response is
//! inspected for the `x-ratelimit-*` headers so callers can tell an exhausted
//! quota apart from any other upstream failure.

pub mod client;
pub mod error;
pub mod models;
pub mod rate_limit;
pub mod slug;

pub use client::{GithubClient, GithubClientConfig};
pub use error::GithubError;
pub use models::{ReleasePayload, RepoPayload, RepoSearchItem};
pub use rate_limit::RateLimit;
pub use slug::RepoSlug;

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, GithubError>;
