//! Process configuration loaded from the environment.
//!
//! Everything is read and validated once at start-up. A bad value is a
//! [`Error::Configuration`] and the process refuses to start.

use std::str::FromStr;
use std::time::Duration;

use cron::Schedule;

use crate::{Error, Result};

pub const DEFAULT_DATABASE_URL: &str = "sqlite:relwatch.db?mode=rwc";
pub const DEFAULT_CRON_SCHEDULE: &str = "*/5 * * * *";
pub const DEFAULT_EMAIL_FROM_NAME: &str = "Release Watch";

/// SMTP relay settings. Absent when `SMTP_HOST` is unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub github_api_url: String,
    /// Credential for scheduler-driven requests.
    pub github_token: Option<String>,
    pub github_request_timeout: Duration,
    /// Normalised six-field cron expression.
    pub cron_schedule: String,
    pub check_batch_size: u32,
    pub release_cache_timeout: Duration,
    pub fanout_concurrency: usize,
    pub email_concurrency: usize,
    pub job_max_attempts: u32,
    pub smtp: Option<SmtpSettings>,
    pub email_from: String,
    pub email_from_name: String,
    pub log_dir: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let cron_schedule = normalize_cron(
            &var("CRON_SCHEDULE").unwrap_or_else(|| DEFAULT_CRON_SCHEDULE.to_string()),
        )?;

        let smtp = match var("SMTP_HOST") {
            Some(host) => Some(SmtpSettings {
                host,
                port: parse_or(&var, "SMTP_PORT", 587u16)?,
                username: var("SMTP_USERNAME"),
                password: var("SMTP_PASSWORD"),
                use_tls: parse_bool_or(&var, "SMTP_USE_TLS", true)?,
            }),
            None => None,
        };

        let email_from = match (var("EMAIL_FROM"), &smtp) {
            (Some(from), _) => from,
            (None, Some(_)) => {
                return Err(Error::config("EMAIL_FROM is required when SMTP_HOST is set"));
            }
            (None, None) => "noreply@example.com".to_string(),
        };

        let config = Self {
            database_url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            github_api_url: var("GITHUB_API_URL")
                .unwrap_or_else(|| github_api::client::DEFAULT_BASE_URL.to_string()),
            github_token: var("GITHUB_TOKEN"),
            github_request_timeout: Duration::from_secs(parse_or(
                &var,
                "GITHUB_REQUEST_TIMEOUT_SECS",
                30u64,
            )?),
            cron_schedule,
            check_batch_size: parse_or(&var, "CHECK_BATCH_SIZE", 10u32)?,
            release_cache_timeout: Duration::from_secs(parse_or(
                &var,
                "RELEASE_CACHE_TIMEOUT_SECS",
                24 * 60 * 60u64,
            )?),
            fanout_concurrency: parse_or(&var, "FANOUT_CONCURRENCY", 5usize)?,
            email_concurrency: parse_or(&var, "EMAIL_CONCURRENCY", 5usize)?,
            job_max_attempts: parse_or(&var, "JOB_MAX_ATTEMPTS", 3u32)?,
            smtp,
            email_from,
            email_from_name: var("EMAIL_FROM_NAME")
                .unwrap_or_else(|| DEFAULT_EMAIL_FROM_NAME.to_string()),
            log_dir: var("LOG_DIR"),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.check_batch_size == 0 {
            return Err(Error::config("CHECK_BATCH_SIZE must be at least 1"));
        }
        if self.fanout_concurrency == 0 || self.email_concurrency == 0 {
            return Err(Error::config("worker concurrency must be at least 1"));
        }
        if self.job_max_attempts == 0 {
            return Err(Error::config("JOB_MAX_ATTEMPTS must be at least 1"));
        }
        if !self.email_from.contains('@') {
            return Err(Error::config(format!(
                "EMAIL_FROM is not an address: {}",
                self.email_from
            )));
        }
        Ok(())
    }

    pub fn schedule(&self) -> Result<Schedule> {
        Schedule::from_str(&self.cron_schedule)
            .map_err(|e| Error::config(format!("invalid CRON_SCHEDULE: {}", e)))
    }
}

/// Accept classic five-field expressions by prefixing a seconds field.
pub fn normalize_cron(expr: &str) -> Result<String> {
    let expr = expr.trim();
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {}", expr)
    } else {
        expr.to_string()
    };

    Schedule::from_str(&normalized)
        .map_err(|e| Error::config(format!("invalid CRON_SCHEDULE '{}': {}", expr, e)))?;
    Ok(normalized)
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::config(format!("invalid {} '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

fn parse_bool_or<F>(var: &F, key: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match var(key).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(Error::config(format!("invalid {} '{}'", key, v))),
    }
}
