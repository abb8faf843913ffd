//! Release notifications.
//!
//! A newly inserted release becomes a `RELEASE_INSERTED` job; [`ReleaseFanout`]
//! turns it into one `RELEASE_NOTIFICATION` job per subscriber with an email,
//! and [`ReleaseEmailHandler`] delivers each through a [`MailTransport`].

mod email;
mod fanout;
mod mailer;

pub use email::{ReleaseEmailHandler, ReleaseNotification};
pub use fanout::{FanoutReport, ReleaseFanout};
pub use mailer::{LogMailer, MailError, MailTransport, OutgoingEmail, SmtpMailer};
