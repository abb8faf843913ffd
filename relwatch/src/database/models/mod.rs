//! Row models, one file per table.

pub mod job;
pub mod release;
pub mod repo;
pub mod subscription;
pub mod user;

pub use job::{JobDbModel, JobKind, JobStatus};
pub use release::ReleaseDbModel;
pub use repo::RepoDbModel;
pub use subscription::{SubscriberContact, SubscriptionDbModel, SubscriptionSummary};
pub use user::UserDbModel;
