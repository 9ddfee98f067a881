use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use super::email::{EmailChannel, SmtpSettings, DEFAULT_PRODUCT_NAME};
use super::queue::{QueueStats, WorkQueue, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};
use super::webhook::{WebhookChannel, WebhookOutcome, DEFAULT_WEBHOOK_TIMEOUT};
use crate::alert::AlertPayload;

/// A notification channel that may take arbitrarily long and therefore runs
/// on the background queue.
///
/// `deliver` must handle and log its own failures.
pub trait BackgroundChannel: Send + Sync {
    fn name(&self) -> &str;

    fn deliver(&self, payload: &AlertPayload);
}

impl BackgroundChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    fn deliver(&self, payload: &AlertPayload) {
        EmailChannel::deliver(self, payload)
    }
}

#[derive(Clone, Debug)]
pub struct DispatchSettings {
    pub webhook_url: Option<String>,
    pub webhook_timeout: Duration,
    pub email_enabled: bool,
    pub smtp: SmtpSettings,
    pub product: String,
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_timeout: DEFAULT_WEBHOOK_TIMEOUT,
            email_enabled: true,
            smtp: SmtpSettings::default(),
            product: DEFAULT_PRODUCT_NAME.to_string(),
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// What happened to one alert on each channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchReport {
    pub webhook: WebhookOutcome,
    /// Background channels accepted by the queue.
    pub queued: Vec<String>,
    /// Background channels dropped because the queue was full or closed.
    pub dropped: Vec<String>,
}

/// Fans an alert out to every enabled channel.
///
/// Background channels are queued first so a slow webhook cannot delay them.
/// The webhook then runs inline, bounded by its timeout.
pub struct NotificationDispatcher {
    webhook: Option<WebhookChannel>,
    background: Vec<Arc<dyn BackgroundChannel>>,
    queue: WorkQueue,
}

impl NotificationDispatcher {
    pub fn new(webhook: Option<WebhookChannel>, queue: WorkQueue) -> Self {
        Self {
            webhook,
            background: Vec::new(),
            queue,
        }
    }

    pub fn with_background(mut self, channel: Arc<dyn BackgroundChannel>) -> Self {
        self.background.push(channel);
        self
    }

    pub fn from_settings(settings: &DispatchSettings) -> Result<Self> {
        let webhook =
            WebhookChannel::from_config(settings.webhook_url.as_deref(), settings.webhook_timeout);
        match &webhook {
            Some(channel) => log::info!("webhook alerts enabled: {}", channel.url()),
            None => log::info!("webhook alerts disabled (no url)"),
        }
        let queue = WorkQueue::new("notify", settings.workers, settings.queue_capacity)?;
        let mut dispatcher = Self::new(webhook, queue);
        if settings.email_enabled {
            if let Some(email) = EmailChannel::from_settings(&settings.smtp, &settings.product) {
                dispatcher = dispatcher.with_background(Arc::new(email));
            }
        } else {
            log::info!("email alerts disabled by configuration");
        }
        Ok(dispatcher)
    }

    /// Channel names in dispatch order.
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .background
            .iter()
            .map(|channel| channel.name().to_string())
            .collect();
        if self.webhook.is_some() {
            names.push("webhook".to_string());
        }
        names
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub fn dispatch(&self, payload: Arc<AlertPayload>) -> DispatchReport {
        let mut queued = Vec::new();
        let mut dropped = Vec::new();
        for channel in &self.background {
            let job_channel = channel.clone();
            let job_payload = payload.clone();
            let job = Box::new(move || job_channel.deliver(&job_payload));
            match self.queue.submit(job) {
                Ok(()) => queued.push(channel.name().to_string()),
                Err(err) => {
                    log::warn!(
                        "{}: alert for {} dropped ({} {})",
                        channel.name(),
                        payload.camera_id,
                        self.queue.name(),
                        err
                    );
                    dropped.push(channel.name().to_string());
                }
            }
        }
        let webhook = match &self.webhook {
            Some(channel) => channel.send(&payload),
            None => WebhookOutcome::Disabled,
        };
        DispatchReport {
            webhook,
            queued,
            dropped,
        }
    }
}
