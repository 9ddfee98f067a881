use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use crate::alert::{Severity, SeverityTable};
use crate::detect::DetectRequest;
use crate::notify::email::{SmtpSecurity, SmtpSettings, DEFAULT_PRODUCT_NAME, DEFAULT_SMTP_TIMEOUT};
use crate::notify::queue::{DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};
use crate::notify::webhook::DEFAULT_WEBHOOK_TIMEOUT;
use crate::notify::DispatchSettings;
use crate::pacer::FramePacer;
use crate::pipeline::PipelineSettings;

const DEFAULT_CAMERA_ID: &str = "webcam_0";
const DEFAULT_FPS_PROCESS: f64 = 5.0;
const DEFAULT_CONF_THRES: f32 = 0.5;
const DEFAULT_IOU_THRES: f32 = 0.45;
const DEFAULT_MIN_PERSISTENT_FRAMES: u32 = 3;
const DEFAULT_FRAMES_DIR: &str = "frames";
const DEFAULT_CLASSES_OF_INTEREST: &[&str] = &["knife", "scissors", "hammer", "screwdriver", "wrench"];

/// Environment variables read by `AlertdConfig::load`.
pub const CONFIG_ENV_VARS: &[&str] = &[
    "VISION_CONFIG",
    "VISION_CAMERA_ID",
    "ALERT_WEBHOOK_URL",
    "EMAIL_SMTP_SERVER",
    "EMAIL_SMTP_PORT",
    "EMAIL_USE_TLS",
    "EMAIL_USE_SSL",
    "EMAIL_USERNAME",
    "EMAIL_PASSWORD",
    "EMAIL_FROM",
    "EMAIL_TO",
];

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AlertdConfigFile {
    camera_id: Option<String>,
    inference: Option<InferenceConfigFile>,
    stream: Option<StreamConfigFile>,
    alerts: Option<AlertsConfigFile>,
    severity: Option<SeverityConfigFile>,
    dispatch: Option<DispatchConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct InferenceConfigFile {
    conf_thres: Option<f32>,
    iou_thres: Option<f32>,
    classes_of_interest: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    fps_process: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertsConfigFile {
    min_persistent_frames: Option<u32>,
    webhook_url: Option<String>,
    send_frame: Option<bool>,
    frames_dir: Option<PathBuf>,
    email: Option<EmailConfigFile>,
}

/// Credentials are only taken from the environment.
#[derive(Debug, Deserialize, Default)]
struct EmailConfigFile {
    enabled: Option<bool>,
    product: Option<String>,
    smtp_server: Option<String>,
    smtp_port: Option<u16>,
    security: Option<SmtpSecurity>,
    from_addr: Option<String>,
    to_addrs: Option<Vec<String>>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SeverityConfigFile {
    default: Option<Severity>,
    classes: Option<BTreeMap<String, Severity>>,
}

#[derive(Debug, Deserialize, Default)]
struct DispatchConfigFile {
    workers: Option<usize>,
    queue_capacity: Option<usize>,
    webhook_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AlertdConfig {
    pub camera_id: String,
    pub inference: InferenceSettings,
    pub fps_process: f64,
    pub min_persistent_frames: u32,
    pub send_frame: bool,
    pub frames_dir: PathBuf,
    pub severity: SeverityTable,
    pub dispatch: DispatchSettings,
}

#[derive(Debug, Clone)]
pub struct InferenceSettings {
    pub conf_thres: f32,
    pub iou_thres: f32,
    pub classes_of_interest: Vec<String>,
}

impl AlertdConfig {
    /// Load from `VISION_CONFIG` (if set), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VISION_CONFIG")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load from an explicit file (or defaults), then apply environment overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AlertdConfigFile) -> Self {
        let inference = file.inference.unwrap_or_default();
        let alerts = file.alerts.unwrap_or_default();
        let email = alerts.email.unwrap_or_default();
        let severity = file.severity.unwrap_or_default();
        let dispatch = file.dispatch.unwrap_or_default();

        let severity = match severity.classes {
            Some(classes) => SeverityTable::new(classes, severity.default.unwrap_or_default()),
            None => {
                let defaults = SeverityTable::default();
                let default_tier = severity.default.unwrap_or(defaults.default_tier());
                SeverityTable::new(
                    defaults
                        .entries()
                        .map(|(class, tier)| (class.to_string(), tier))
                        .collect::<Vec<_>>(),
                    default_tier,
                )
            }
        };

        let security = email.security.unwrap_or_default();
        let smtp = SmtpSettings {
            server: email.smtp_server,
            port: email.smtp_port,
            security,
            username: None,
            password: None,
            from_addr: email.from_addr,
            to_addrs: email.to_addrs.unwrap_or_default(),
            timeout: email
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SMTP_TIMEOUT),
        };

        Self {
            camera_id: file
                .camera_id
                .unwrap_or_else(|| DEFAULT_CAMERA_ID.to_string()),
            inference: InferenceSettings {
                conf_thres: inference.conf_thres.unwrap_or(DEFAULT_CONF_THRES),
                iou_thres: inference.iou_thres.unwrap_or(DEFAULT_IOU_THRES),
                classes_of_interest: inference.classes_of_interest.unwrap_or_else(|| {
                    DEFAULT_CLASSES_OF_INTEREST
                        .iter()
                        .map(|c| c.to_string())
                        .collect()
                }),
            },
            fps_process: file
                .stream
                .and_then(|stream| stream.fps_process)
                .unwrap_or(DEFAULT_FPS_PROCESS),
            min_persistent_frames: alerts
                .min_persistent_frames
                .unwrap_or(DEFAULT_MIN_PERSISTENT_FRAMES),
            send_frame: alerts.send_frame.unwrap_or(true),
            frames_dir: alerts
                .frames_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FRAMES_DIR)),
            severity,
            dispatch: DispatchSettings {
                webhook_url: alerts.webhook_url,
                webhook_timeout: dispatch
                    .webhook_timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_WEBHOOK_TIMEOUT),
                email_enabled: email.enabled.unwrap_or(true),
                smtp,
                product: email
                    .product
                    .unwrap_or_else(|| DEFAULT_PRODUCT_NAME.to_string()),
                workers: dispatch.workers.unwrap_or(DEFAULT_WORKERS),
                queue_capacity: dispatch.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(camera_id) = env_value("VISION_CAMERA_ID") {
            self.camera_id = camera_id;
        }
        if let Some(url) = env_value("ALERT_WEBHOOK_URL") {
            self.dispatch.webhook_url = Some(url);
        }

        let smtp = &mut self.dispatch.smtp;
        if let Some(server) = env_value("EMAIL_SMTP_SERVER") {
            smtp.server = Some(server);
        }
        if let Some(port) = env_value("EMAIL_SMTP_PORT") {
            smtp.port = Some(
                port.parse()
                    .map_err(|_| anyhow!("EMAIL_SMTP_PORT must be a port number (1-65535)"))?,
            );
        }
        let use_ssl = env_bool("EMAIL_USE_SSL")?;
        let use_tls = env_bool("EMAIL_USE_TLS")?;
        if use_ssl.is_some() || use_tls.is_some() {
            // Flags left unset keep the mode from the config file.
            let (file_ssl, file_tls) = match smtp.security {
                SmtpSecurity::Ssl => (true, true),
                SmtpSecurity::StartTls => (false, true),
                SmtpSecurity::None => (false, false),
            };
            smtp.security = SmtpSecurity::from_flags(
                use_ssl.unwrap_or(file_ssl),
                use_tls.unwrap_or(file_tls),
            );
        }
        if let Some(username) = env_value("EMAIL_USERNAME") {
            smtp.username = Some(username);
        }
        // Not trimmed: passwords may contain leading or trailing spaces.
        if let Ok(password) = std::env::var("EMAIL_PASSWORD") {
            if !password.is_empty() {
                smtp.password = Some(password);
            }
        }
        if let Some(from) = env_value("EMAIL_FROM") {
            smtp.from_addr = Some(from);
        }
        if let Ok(to) = std::env::var("EMAIL_TO") {
            let parsed = split_csv(&to);
            if !parsed.is_empty() {
                smtp.to_addrs = parsed;
            }
        }
        // Port follows the security mode unless configured explicitly.
        if smtp.port.is_none() {
            smtp.port = Some(smtp.security.default_port());
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.camera_id = validate_camera_id(&self.camera_id)?;

        if !self.fps_process.is_finite() || self.fps_process <= 0.0 {
            return Err(anyhow!("fps_process must be greater than zero"));
        }
        FramePacer::new(self.fps_process)?;
        for (name, value) in [
            ("conf_thres", self.inference.conf_thres),
            ("iou_thres", self.inference.iou_thres),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
            }
        }
        if self.min_persistent_frames == 0 {
            return Err(anyhow!("min_persistent_frames must be at least 1"));
        }
        self.inference.classes_of_interest = self
            .inference
            .classes_of_interest
            .iter()
            .map(|class| class.trim().to_string())
            .filter(|class| !class.is_empty())
            .collect();
        if self.inference.classes_of_interest.is_empty() {
            return Err(anyhow!("classes_of_interest must name at least one class"));
        }
        if self.dispatch.workers == 0 || self.dispatch.queue_capacity == 0 {
            return Err(anyhow!("dispatch workers and queue_capacity must be greater than zero"));
        }
        if self.dispatch.webhook_timeout.is_zero() {
            return Err(anyhow!("webhook_timeout_ms must be greater than zero"));
        }
        Ok(())
    }

    pub fn detect_request(&self) -> DetectRequest {
        DetectRequest::new(
            self.inference.conf_thres,
            self.inference.iou_thres,
            self.inference.classes_of_interest.iter().cloned(),
        )
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            camera_id: self.camera_id.clone(),
            request: self.detect_request(),
            fps_process: self.fps_process,
            min_persistent_frames: self.min_persistent_frames,
            frames_dir: self.send_frame.then(|| self.frames_dir.clone()),
        }
    }
}

/// Camera ids are local labels: `^[a-z0-9][a-z0-9_.:-]{0,63}$`, lower-cased.
pub fn validate_camera_id(camera_id: &str) -> Result<String> {
    static CAMERA_ID_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = CAMERA_ID_RE
        .get_or_init(|| regex::Regex::new(r"^[a-z0-9][a-z0-9_.:-]{0,63}$").unwrap());
    let normalized = camera_id.trim().to_lowercase();
    if !re.is_match(&normalized) {
        return Err(anyhow!(
            "camera_id '{}' must match ^[a-z0-9][a-z0-9_.:-]{{0,63}}$",
            camera_id
        ));
    }
    Ok(normalized)
}

fn read_config_file(path: &Path) -> Result<AlertdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("invalid config file {}", path.display()))
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_bool(key: &str) -> Result<Option<bool>> {
    let Some(value) = env_value(key) else {
        return Ok(None);
    };
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(Some(true)),
        "false" | "0" | "no" | "off" => Ok(Some(false)),
        _ => Err(anyhow!("{} must be true or false, got '{}'", key, value)),
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let cfg = AlertdConfig::from_file(AlertdConfigFile::default());
        assert_eq!(cfg.camera_id, "webcam_0");
        assert_eq!(cfg.fps_process, 5.0);
        assert_eq!(cfg.inference.conf_thres, 0.5);
        assert_eq!(cfg.inference.iou_thres, 0.45);
        assert_eq!(cfg.min_persistent_frames, 3);
        assert!(cfg.send_frame);
        assert!(cfg.dispatch.email_enabled);
        assert_eq!(cfg.dispatch.webhook_timeout, Duration::from_secs(3));
        assert_eq!(cfg.severity, SeverityTable::default());
    }

    #[test]
    fn parses_toml_sections() {
        let raw = r#"
            camera_id = "Dock_2"

            [inference]
            conf_thres = 0.6
            classes_of_interest = ["knife", " bat "]

            [stream]
            fps_process = 2.5

            [alerts]
            min_persistent_frames = 4
            webhook_url = "http://127.0.0.1:8000/alert"
            send_frame = false

            [alerts.email]
            enabled = false
            product = "GateWatch"
            security = "ssl"

            [severity]
            default = "high"

            [severity.classes]
            bat = "medium"

            [dispatch]
            workers = 3
            webhook_timeout_ms = 1500
        "#;
        let file: AlertdConfigFile = toml::from_str(raw).unwrap();
        let mut cfg = AlertdConfig::from_file(file);
        cfg.validate().unwrap();

        assert_eq!(cfg.camera_id, "dock_2");
        assert_eq!(cfg.inference.conf_thres, 0.6);
        assert_eq!(cfg.inference.classes_of_interest, vec!["knife", "bat"]);
        assert_eq!(cfg.fps_process, 2.5);
        assert_eq!(cfg.min_persistent_frames, 4);
        assert!(cfg.pipeline_settings().frames_dir.is_none());
        assert!(!cfg.dispatch.email_enabled);
        assert_eq!(cfg.dispatch.product, "GateWatch");
        assert_eq!(cfg.dispatch.smtp.security, SmtpSecurity::Ssl);
        assert_eq!(cfg.dispatch.workers, 3);
        assert_eq!(cfg.dispatch.webhook_timeout, Duration::from_millis(1500));
        assert_eq!(cfg.severity.tier("bat"), Severity::Medium);
        assert_eq!(cfg.severity.tier("knife"), Severity::High);
    }

    #[test]
    fn rejects_unknown_top_level_keys() {
        assert!(toml::from_str::<AlertdConfigFile>("camera = \"x\"").is_err());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let base = || AlertdConfig::from_file(AlertdConfigFile::default());

        let mut cfg = base();
        cfg.fps_process = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = base();
        cfg.fps_process = 1e-20;
        assert!(cfg.validate().is_err());

        let mut cfg = base();
        cfg.inference.conf_thres = 1.2;
        assert!(cfg.validate().is_err());

        let mut cfg = base();
        cfg.min_persistent_frames = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = base();
        cfg.inference.classes_of_interest = vec!["  ".into()];
        assert!(cfg.validate().is_err());

        let mut cfg = base();
        cfg.camera_id = "front door/1".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn camera_id_is_normalized() {
        assert_eq!(validate_camera_id(" Webcam_0 ").unwrap(), "webcam_0");
        assert_eq!(validate_camera_id("lobby:cam-2.a").unwrap(), "lobby:cam-2.a");
        assert!(validate_camera_id("").is_err());
        assert!(validate_camera_id("_hidden").is_err());
    }

    #[test]
    fn split_csv_drops_blanks() {
        assert_eq!(split_csv(" a@x.io, ,b@x.io,"), vec!["a@x.io", "b@x.io"]);
    }
}
