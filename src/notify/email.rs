//! SMTP email channel.
//!
//! Sends a multipart alert mail (plain-text summary + optional JPEG of the
//! alert frame). The channel only exists when the SMTP configuration is
//! complete; an incomplete configuration disables it with a log line.
//! Delivery runs on the dispatcher's background queue, never on the frame loop.

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::alert::AlertPayload;

pub const DEFAULT_SMTP_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PRODUCT_NAME: &str = "VisionSecure";

/// How the SMTP connection is secured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// TLS from the first byte (SMTPS, usually port 465).
    Ssl,
    /// Plain connect upgraded with STARTTLS (submission, usually port 587).
    #[default]
    StartTls,
    /// No encryption. Sandbox servers only.
    None,
}

impl SmtpSecurity {
    /// Map the `EMAIL_USE_SSL` / `EMAIL_USE_TLS` flags. SSL wins when both are set.
    pub fn from_flags(use_ssl: bool, use_tls: bool) -> Self {
        match (use_ssl, use_tls) {
            (true, _) => Self::Ssl,
            (false, true) => Self::StartTls,
            (false, false) => Self::None,
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Self::Ssl => 465,
            Self::StartTls => 587,
            Self::None => 25,
        }
    }
}

impl std::fmt::Display for SmtpSecurity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ssl => write!(f, "ssl"),
            Self::StartTls => write!(f, "starttls"),
            Self::None => write!(f, "none"),
        }
    }
}

/// SMTP settings as configured; any field may be missing.
#[derive(Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub server: Option<String>,
    pub port: Option<u16>,
    pub security: SmtpSecurity,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_addr: Option<String>,
    pub to_addrs: Vec<String>,
    pub timeout: Duration,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            server: None,
            port: None,
            security: SmtpSecurity::default(),
            username: None,
            password: None,
            from_addr: None,
            to_addrs: Vec::new(),
            timeout: DEFAULT_SMTP_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("security", &self.security)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("from_addr", &self.from_addr)
            .field("to_addrs", &self.to_addrs)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl SmtpSettings {
    /// Names of the required fields that are missing or blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if present(&self.server).is_none() {
            missing.push("server");
        }
        if present(&self.username).is_none() {
            missing.push("username");
        }
        // Passwords are not trimmed, but an empty one is still missing.
        if self.password.as_deref().map_or(true, str::is_empty) {
            missing.push("password");
        }
        if present(&self.from_addr).is_none() {
            missing.push("from_addr");
        }
        if !self.to_addrs.iter().any(|addr| !addr.trim().is_empty()) {
            missing.push("to_addrs");
        }
        missing
    }

    pub fn complete(&self) -> Option<EmailSettings> {
        if !self.missing_fields().is_empty() {
            return None;
        }
        Some(EmailSettings {
            server: present(&self.server)?,
            port: self.port.unwrap_or_else(|| self.security.default_port()),
            security: self.security,
            username: present(&self.username)?,
            password: self.password.clone()?,
            from_addr: present(&self.from_addr)?,
            to_addrs: self
                .to_addrs
                .iter()
                .map(|addr| addr.trim())
                .filter(|addr| !addr.is_empty())
                .map(str::to_string)
                .collect(),
            timeout: self.timeout,
        })
    }
}

/// Complete SMTP settings.
#[derive(Clone, PartialEq, Eq)]
pub struct EmailSettings {
    pub server: String,
    pub port: u16,
    pub security: SmtpSecurity,
    pub username: String,
    pub password: String,
    pub from_addr: String,
    pub to_addrs: Vec<String>,
    pub timeout: Duration,
}

/// Diagnostic category for a failed send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// Server rejected the credentials.
    Auth,
    /// Could not connect, resolve or negotiate TLS.
    Connect,
    /// Server answered with an unexpected or negative reply.
    Protocol,
    /// Connect or read took longer than the configured timeout.
    Timeout,
    /// The mail could not be assembled (bad address, header).
    Message,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth => write!(f, "auth"),
            Self::Connect => write!(f, "connect"),
            Self::Protocol => write!(f, "protocol"),
            Self::Timeout => write!(f, "timeout"),
            Self::Message => write!(f, "message"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl EmailFailure {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for EmailFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "email[{}]: {}", self.kind, self.message)
    }
}

impl std::error::Error for EmailFailure {}

/// SMTP reply codes that mean the credentials were refused.
pub fn classify_reply_code(code: &str) -> FailureKind {
    match code {
        "530" | "534" | "535" | "538" => FailureKind::Auth,
        _ => FailureKind::Protocol,
    }
}

fn chain_mentions_timeout(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ) {
                return true;
            }
        }
        let text = e.to_string().to_lowercase();
        if text.contains("timed out") || text.contains("temporarily unavailable") {
            return true;
        }
        current = e.source();
    }
    false
}

fn classify(err: &lettre::transport::smtp::Error) -> FailureKind {
    if chain_mentions_timeout(err) {
        return FailureKind::Timeout;
    }
    if let Some(code) = err.status() {
        return classify_reply_code(&code.to_string());
    }
    if err.is_client() && err.to_string().to_lowercase().contains("authentication") {
        return FailureKind::Auth;
    }
    if err.is_response() {
        return FailureKind::Protocol;
    }
    FailureKind::Connect
}

pub fn subject_line(product: &str, payload: &AlertPayload) -> String {
    format!(
        "[{}] Alert {} - {}",
        product,
        payload.severity.as_str().to_uppercase(),
        payload.camera_id
    )
}

pub fn body_text(payload: &AlertPayload) -> String {
    let mut lines = vec![
        format!("Timestamp: {}", payload.timestamp),
        format!("Camera: {}", payload.camera_id),
        format!("Severity: {}", payload.severity),
        String::new(),
        "Objects detected:".to_string(),
    ];
    for obj in &payload.objects_detected {
        lines.push(format!(
            "- Class: {}, Confidence: {:.2}, BBox: {}",
            obj.class, obj.confidence, obj.bbox
        ));
    }
    if let Some(frame_path) = &payload.frame_path {
        lines.push(String::new());
        lines.push(format!("Frame saved at: {}", frame_path));
    }
    lines.join("\n")
}

/// Read the alert frame as a JPEG attachment. Unreadable frames are skipped.
fn frame_attachment(frame_path: &str) -> Option<SinglePart> {
    let path = Path::new(frame_path);
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::warn!(
                "email: frame {} not attached: {}",
                path.display(),
                err
            );
            return None;
        }
    };
    let content_type = match ContentType::parse("image/jpeg") {
        Ok(content_type) => content_type,
        Err(err) => {
            log::warn!("email: frame not attached: {}", err);
            return None;
        }
    };
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "frame.jpg".to_string());
    Some(Attachment::new(filename).body(bytes, content_type))
}

pub struct EmailChannel {
    settings: EmailSettings,
    product: String,
    transport: SmtpTransport,
}

impl std::fmt::Debug for EmailChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailChannel")
            .field("server", &self.settings.server)
            .field("port", &self.settings.port)
            .field("security", &self.settings.security)
            .field("to_addrs", &self.settings.to_addrs)
            .finish()
    }
}

impl EmailChannel {
    pub fn new(settings: EmailSettings, product: &str) -> Result<Self, EmailFailure> {
        let builder = match settings.security {
            SmtpSecurity::Ssl => SmtpTransport::relay(&settings.server)
                .map_err(|e| EmailFailure::new(FailureKind::Connect, e.to_string()))?,
            SmtpSecurity::StartTls => SmtpTransport::starttls_relay(&settings.server)
                .map_err(|e| EmailFailure::new(FailureKind::Connect, e.to_string()))?,
            SmtpSecurity::None => SmtpTransport::builder_dangerous(settings.server.as_str()),
        };
        let transport = builder
            .port(settings.port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .timeout(Some(settings.timeout))
            .build();
        Ok(Self {
            settings,
            product: product.to_string(),
            transport,
        })
    }

    /// Channel for possibly-incomplete settings; `None` when disabled.
    pub fn from_settings(smtp: &SmtpSettings, product: &str) -> Option<Self> {
        let Some(settings) = smtp.complete() else {
            log::warn!(
                "email configuration incomplete (missing: {}); email alerts disabled",
                smtp.missing_fields().join(", ")
            );
            return None;
        };
        match Self::new(settings, product) {
            Ok(channel) => {
                log::info!(
                    "email alerts enabled via {}:{} ({})",
                    channel.settings.server,
                    channel.settings.port,
                    channel.settings.security
                );
                Some(channel)
            }
            Err(err) => {
                log::warn!("{}; email alerts disabled", err);
                None
            }
        }
    }

    /// Assemble the alert mail.
    pub fn compose(&self, payload: &AlertPayload) -> Result<Message, EmailFailure> {
        let from: Mailbox = self.settings.from_addr.parse().map_err(|e| {
            EmailFailure::new(
                FailureKind::Message,
                format!("invalid from address '{}': {}", self.settings.from_addr, e),
            )
        })?;
        let mut builder = Message::builder()
            .from(from)
            .subject(subject_line(&self.product, payload));
        for to in &self.settings.to_addrs {
            let mailbox: Mailbox = to.parse().map_err(|e| {
                EmailFailure::new(
                    FailureKind::Message,
                    format!("invalid to address '{}': {}", to, e),
                )
            })?;
            builder = builder.to(mailbox);
        }

        let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(body_text(payload)));
        if let Some(attachment) = payload.frame_path.as_deref().and_then(frame_attachment) {
            parts = parts.singlepart(attachment);
        }
        builder
            .multipart(parts)
            .map_err(|e| EmailFailure::new(FailureKind::Message, e.to_string()))
    }

    /// Connect, authenticate and send. Blocks for up to the SMTP timeout per step.
    pub fn send(&self, payload: &AlertPayload) -> Result<(), EmailFailure> {
        let message = self.compose(payload)?;
        self.transport
            .send(&message)
            .map(|_| ())
            .map_err(|err| EmailFailure::new(classify(&err), err.to_string()))
    }

    /// Send and log the outcome. Never fails.
    pub fn deliver(&self, payload: &AlertPayload) {
        match self.send(payload) {
            Ok(()) => log::info!(
                "email: alert for {} sent to {}",
                payload.camera_id,
                self.settings.to_addrs.join(", ")
            ),
            Err(err) => log::error!("{}", err),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmailOutcome {
    /// Email alerts switched off.
    Disabled,
    /// Settings incomplete; nothing was sent.
    Incomplete { missing: Vec<&'static str> },
    Sent,
    Failed(EmailFailure),
}

/// Synchronous one-off send. The dispatcher uses `EmailChannel` on its
/// background queue instead.
pub fn send_email_alert(
    smtp: &SmtpSettings,
    product: &str,
    payload: &AlertPayload,
    enabled: bool,
) -> EmailOutcome {
    if !enabled {
        return EmailOutcome::Disabled;
    }
    let missing = smtp.missing_fields();
    if !missing.is_empty() {
        log::warn!(
            "email configuration incomplete (missing: {}); not sending",
            missing.join(", ")
        );
        return EmailOutcome::Incomplete { missing };
    }
    let Some(channel) = EmailChannel::from_settings(smtp, product) else {
        return EmailOutcome::Failed(EmailFailure::new(
            FailureKind::Connect,
            "smtp transport could not be configured",
        ));
    };
    match channel.send(payload) {
        Ok(()) => EmailOutcome::Sent,
        Err(err) => {
            log::error!("{}", err);
            EmailOutcome::Failed(err)
        }
    }
}
