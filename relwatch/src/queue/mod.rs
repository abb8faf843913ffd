//! Storage-backed job queue with at-least-once delivery.
//!
//! Jobs are rows in the `jobs` table. Worker pools claim them atomically,
//! hand them to a [`JobHandler`], and either complete them or reschedule them
//! with exponential backoff until the attempt ceiling.

pub mod backoff;
pub mod job_queue;
pub mod worker_pool;

pub use job_queue::{
    EnqueueOutcome, FailOutcome, JobOptions, JobQueue, QueuedJob, release_inserted_key,
    release_notification_key,
};
pub use worker_pool::{JobHandler, WorkerPool, WorkerPoolConfig};
