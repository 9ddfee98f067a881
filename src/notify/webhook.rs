//! JSON webhook channel.
//!
//! One POST per alert, bounded by a short timeout. Failures are logged and
//! reported as a `WebhookOutcome`; nothing is retried.

use anyhow::{anyhow, Context, Result};
use std::time::Duration;
use url::Url;

use crate::alert::AlertPayload;

pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// No URL configured; nothing was sent.
    Disabled,
    /// Receiver answered 2xx.
    Delivered { status: u16 },
    /// Receiver answered with a non-2xx status.
    Rejected { status: u16 },
    /// Transport failure (DNS, connect, timeout, TLS, serialization).
    Failed { reason: String },
}

#[derive(Clone, Debug)]
pub struct WebhookChannel {
    url: Url,
    agent: ureq::Agent,
}

impl WebhookChannel {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url.trim()).with_context(|| format!("parse webhook url '{}'", url))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "unsupported webhook scheme '{}'; expected http or https",
                url.scheme()
            ));
        }
        if timeout.is_zero() {
            return Err(anyhow!("webhook timeout must be greater than zero"));
        }
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self { url, agent })
    }

    /// Channel for an optional configured URL.
    ///
    /// A missing or blank URL disables the channel. An invalid URL disables it
    /// with a warning instead of failing startup.
    pub fn from_config(url: Option<&str>, timeout: Duration) -> Option<Self> {
        let url = url.map(str::trim).filter(|url| !url.is_empty())?;
        match Self::new(url, timeout) {
            Ok(channel) => Some(channel),
            Err(err) => {
                log::warn!("webhook disabled: {:#}", err);
                None
            }
        }
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// POST `payload` as JSON. Never panics, never retries.
    pub fn send(&self, payload: &AlertPayload) -> WebhookOutcome {
        let body = match payload.to_json() {
            Ok(body) => body,
            Err(err) => {
                log::error!("webhook: {:#}", err);
                return WebhookOutcome::Failed {
                    reason: format!("{:#}", err),
                };
            }
        };
        let result = self
            .agent
            .post(self.url.as_str())
            .set("Content-Type", "application/json")
            .send_string(&body);
        match result {
            Ok(response) => {
                let status = response.status();
                // ureq maps >= 400 to errors; 1xx/3xx that reach here are not success.
                if (200..300).contains(&status) {
                    log::info!(
                        "webhook: alert for {} delivered to {} (status {})",
                        payload.camera_id,
                        self.url,
                        status
                    );
                    WebhookOutcome::Delivered { status }
                } else {
                    log::warn!(
                        "webhook: {} answered status {}; alert not delivered",
                        self.url,
                        status
                    );
                    WebhookOutcome::Rejected { status }
                }
            }
            Err(ureq::Error::Status(status, _)) => {
                log::warn!("webhook: {} rejected alert with status {}", self.url, status);
                WebhookOutcome::Rejected { status }
            }
            Err(ureq::Error::Transport(err)) => {
                log::warn!("webhook: failed to reach {}: {}", self.url, err);
                WebhookOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }
}

/// Send to an optional URL; blank or missing means no network call.
pub fn send_webhook_alert(
    url: Option<&str>,
    payload: &AlertPayload,
    timeout: Duration,
) -> WebhookOutcome {
    match WebhookChannel::from_config(url, timeout) {
        Some(channel) => channel.send(payload),
        None => WebhookOutcome::Disabled,
    }
}
