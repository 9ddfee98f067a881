//! Alert notification channels.
//!
//! - `webhook`: JSON POST, inline, bounded by a short timeout
//! - `email`: SMTP multipart mail, runs on the background queue
//! - `queue`: bounded worker pool for slow channels
//! - `dispatcher`: fans one alert out to every enabled channel
//!
//! Channel failures are logged and reported, never propagated to the frame loop.

pub mod dispatcher;
pub mod email;
pub mod queue;
pub mod webhook;

pub use dispatcher::{BackgroundChannel, DispatchReport, DispatchSettings, NotificationDispatcher};
pub use email::{
    send_email_alert, EmailChannel, EmailFailure, EmailOutcome, EmailSettings, FailureKind,
    SmtpSecurity, SmtpSettings,
};
pub use queue::{QueueStats, SubmitError, WorkQueue};
pub use webhook::{send_webhook_alert, WebhookChannel, WebhookOutcome};
