//! Terminal notification jobs: render and send one email.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::mailer::{MailTransport, OutgoingEmail};
use crate::Result;
use crate::database::models::JobKind;
use crate::queue::{JobHandler, QueuedJob};

/// Payload of a `RELEASE_NOTIFICATION` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseNotification {
    pub to: String,
    pub user_id: String,
    pub release_id: String,
    pub release_name: String,
    /// `owner/repo`
    pub repo_full_name: String,
    pub url: String,
}

impl ReleaseNotification {
    pub fn render(&self) -> OutgoingEmail {
        let release = escape_html(&self.release_name);
        let repo = escape_html(&self.repo_full_name);
        let url = escape_html(&self.url);

        OutgoingEmail {
            to: self.to.clone(),
            subject: format!(
                "New Release: {} for {}",
                self.release_name, self.repo_full_name
            ),
            text: format!(
                "A new release \"{}\" is available for {}. View it here: {}",
                self.release_name, self.repo_full_name, self.url
            ),
            html: format!(
                "<h1>New Release Available</h1>\
                 <p>A new release <strong>{release}</strong> is available for <strong>{repo}</strong>.</p>\
                 <p><a href=\"{url}\">View the release details</a></p>"
            ),
        }
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub struct ReleaseEmailHandler {
    mailer: Arc<dyn MailTransport>,
}

impl ReleaseEmailHandler {
    pub fn new(mailer: Arc<dyn MailTransport>) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl JobHandler for ReleaseEmailHandler {
    fn name(&self) -> &'static str {
        "release-email"
    }

    fn kinds(&self) -> &'static [JobKind] {
        &[JobKind::ReleaseNotification]
    }

    async fn handle(&self, job: &QueuedJob) -> Result<()> {
        let notification: ReleaseNotification = job.payload()?;
        let email = notification.render();
        self.mailer.send(&email).await?;
        debug!(
            job_id = %job.id,
            user_id = %notification.user_id,
            release_id = %notification.release_id,
            "Release notification delivered"
        );
        Ok(())
    }
}
