//! Periodic release checking.
//!
//! A [`PeriodicTrigger`] turns the cron schedule into `CHECK_RELEASES` jobs;
//! a single-worker pool runs them through [`CheckReleasesHandler`], which
//! calls [`ReleaseCheckScheduler::run_once`].

mod service;
mod trigger;

pub use service::{CheckReleasesHandler, CheckRunReport, RateLimitHalt, ReleaseCheckScheduler};
pub use trigger::{JOB_RETENTION, PeriodicTrigger};
