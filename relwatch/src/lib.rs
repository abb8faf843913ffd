//! relwatch library crate.
//!
//! Watches GitHub repositories for new releases and emails their
//! subscribers. The binary wires these modules through
//! [`services::ServiceContainer`]; integration tests use them directly.

pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod notification;
pub mod queue;
pub mod releases;
pub mod scheduler;
pub mod services;
pub mod subscriptions;

pub use error::{Error, Result};
