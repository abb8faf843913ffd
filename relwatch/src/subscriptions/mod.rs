//! User-facing subscription operations.

mod service;

pub use service::{
    CREATE_SUBSCRIPTION_FAILED, FETCH_REPOSITORY_FAILED, OperationError, OperationOutcome,
    REMOVE_SUBSCRIPTION_FAILED, SubscriptionService,
};
