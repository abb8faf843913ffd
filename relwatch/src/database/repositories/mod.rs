//! Repository layer for database access.
//!
//! One `async_trait` trait per aggregate with an sqlx implementation. Callers
//! hold `Arc<dyn XRepository>` so tests can swap in fakes.

pub mod job;
pub mod release;
pub mod repo;
pub mod subscription;
pub mod user;

pub use job::*;
pub use release::*;
pub use repo::*;
pub use subscription::*;
pub use user::*;

/// Result of an insert-or-update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted<T> {
    /// The row as stored after the statement.
    pub row: T,
    /// True only when this call created the row.
    pub inserted: bool,
}

impl<T> Upserted<T> {
    pub fn inserted(row: T) -> Self {
        Self {
            row,
            inserted: true,
        }
    }

    pub fn existing(row: T) -> Self {
        Self {
            row,
            inserted: false,
        }
    }
}
