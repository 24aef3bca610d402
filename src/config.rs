//! Configuration module.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::scheduler::{AlerterConfig, RecheckerConfig};

/// Invalid configuration value.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{name}: invalid duration {value:?}")]
    Duration { name: String, value: String },
    #[error("{name}: invalid number {value:?}")]
    Number { name: String, value: String },
    #[error("{name}: invalid boolean {value:?}")]
    Bool { name: String, value: String },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address for the API (default: 0.0.0.0:8080)
    pub http_addr: String,
    /// SQLite database path; in-memory storage when unset
    pub db_path: Option<String>,
    pub log_format: LogFormat,

    pub recheck_interval: Duration,
    pub check_timeout: Duration,
    pub check_concurrency: usize,
    pub probe_attempts: u32,
    pub probe_backoff: Duration,

    pub alert_on_recovery: bool,
    pub alert_cooldown: Duration,
    pub alert_poll_interval: Duration,
    pub slack_webhook: Option<String>,

    /// Requests per minute per client; 0 disables rate limiting
    pub rate_limit_rpm: f64,
    pub rate_limit_burst: u32,

    pub admin_api_keys: Vec<String>,
    pub public_api_keys: Vec<String>,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8080".to_string(),
            db_path: None,
            log_format: LogFormat::Text,
            recheck_interval: Duration::from_secs(60),
            check_timeout: Duration::from_secs(10),
            check_concurrency: 8,
            probe_attempts: 2,
            probe_backoff: Duration::from_millis(300),
            alert_on_recovery: true,
            alert_cooldown: Duration::from_secs(600),
            alert_poll_interval: Duration::from_secs(30),
            slack_webhook: None,
            rate_limit_rpm: 120.0,
            rate_limit_burst: 60,
            admin_api_keys: Vec::new(),
            public_api_keys: Vec::new(),
            allowed_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// Environment variables (all optional):
    /// - `UPTIME_HTTP_ADDR`: listen address
    /// - `UPTIME_DB_PATH`: SQLite file path
    /// - `UPTIME_LOG_FORMAT`: `text` or `json`
    /// - `UPTIME_RECHECK_INTERVAL`, `UPTIME_CHECK_TIMEOUT`, `UPTIME_CHECK_CONCURRENCY`
    /// - `UPTIME_PROBE_ATTEMPTS`, `UPTIME_PROBE_BACKOFF`
    /// - `UPTIME_ALERT_ON_RECOVERY`, `UPTIME_ALERT_COOLDOWN`, `UPTIME_ALERT_POLL_INTERVAL`
    /// - `UPTIME_SLACK_WEBHOOK`
    /// - `UPTIME_RATE_LIMIT_RPM`, `UPTIME_RATE_LIMIT_BURST`
    /// - `UPTIME_ADMIN_API_KEYS`, `UPTIME_PUBLIC_API_KEYS`, `UPTIME_ALLOWED_ORIGINS` (comma-separated)
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut cfg = Self::default();

        if let Some(addr) = get("UPTIME_HTTP_ADDR") {
            cfg.http_addr = addr;
        }
        cfg.db_path = get("UPTIME_DB_PATH");
        if let Some(format) = get("UPTIME_LOG_FORMAT") {
            cfg.log_format = if format.eq_ignore_ascii_case("json") {
                LogFormat::Json
            } else {
                LogFormat::Text
            };
        }

        if let Some(v) = get("UPTIME_RECHECK_INTERVAL") {
            cfg.recheck_interval = duration_var("UPTIME_RECHECK_INTERVAL", &v)?;
        }
        if let Some(v) = get("UPTIME_CHECK_TIMEOUT") {
            cfg.check_timeout = duration_var("UPTIME_CHECK_TIMEOUT", &v)?;
        }
        if let Some(v) = get("UPTIME_CHECK_CONCURRENCY") {
            cfg.check_concurrency = number_var("UPTIME_CHECK_CONCURRENCY", &v)?;
        }
        if let Some(v) = get("UPTIME_PROBE_ATTEMPTS") {
            cfg.probe_attempts = number_var("UPTIME_PROBE_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("UPTIME_PROBE_BACKOFF") {
            cfg.probe_backoff = duration_var("UPTIME_PROBE_BACKOFF", &v)?;
        }

        if let Some(v) = get("UPTIME_ALERT_ON_RECOVERY") {
            cfg.alert_on_recovery = bool_var("UPTIME_ALERT_ON_RECOVERY", &v)?;
        }
        if let Some(v) = get("UPTIME_ALERT_COOLDOWN") {
            cfg.alert_cooldown = duration_var("UPTIME_ALERT_COOLDOWN", &v)?;
        }
        if let Some(v) = get("UPTIME_ALERT_POLL_INTERVAL") {
            cfg.alert_poll_interval = duration_var("UPTIME_ALERT_POLL_INTERVAL", &v)?;
        }
        cfg.slack_webhook = get("UPTIME_SLACK_WEBHOOK");

        if let Some(v) = get("UPTIME_RATE_LIMIT_RPM") {
            cfg.rate_limit_rpm = number_var("UPTIME_RATE_LIMIT_RPM", &v)?;
        }
        if let Some(v) = get("UPTIME_RATE_LIMIT_BURST") {
            cfg.rate_limit_burst = number_var("UPTIME_RATE_LIMIT_BURST", &v)?;
        }

        cfg.admin_api_keys = get("UPTIME_ADMIN_API_KEYS").map(|v| split_list(&v)).unwrap_or_default();
        cfg.public_api_keys = get("UPTIME_PUBLIC_API_KEYS").map(|v| split_list(&v)).unwrap_or_default();
        cfg.allowed_origins = get("UPTIME_ALLOWED_ORIGINS").map(|v| split_list(&v)).unwrap_or_default();

        Ok(cfg)
    }

    pub fn rechecker(&self) -> RecheckerConfig {
        RecheckerConfig {
            interval: self.recheck_interval,
            timeout: self.check_timeout,
            concurrency: self.check_concurrency,
        }
    }

    pub fn alerter(&self) -> AlerterConfig {
        AlerterConfig {
            alert_on_recovery: self.alert_on_recovery,
            cooldown: self.alert_cooldown,
            poll_interval: self.alert_poll_interval,
        }
    }

    /// Deployment concerns worth logging at startup.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.admin_api_keys.is_empty() {
            warnings.push("no admin API keys configured; write routes are open".to_string());
        }
        if self.public_api_keys.is_empty() && self.admin_api_keys.is_empty() {
            warnings.push("no API keys configured; read routes are open".to_string());
        }
        if self.db_path.is_none() {
            warnings.push("no database path configured; results are kept in memory".to_string());
        }
        if self.allowed_origins.is_empty() {
            warnings.push("no CORS allowlist configured; all origins are allowed".to_string());
        }
        if self.slack_webhook.is_none() {
            warnings.push("no Slack webhook configured; alerts are only logged".to_string());
        }
        warnings
    }
}

/// Parse `300ms`, `30s`, `5m`, `1h`, or bare seconds (fractions allowed).
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (number, scale) = if let Some(n) = s.strip_suffix("ms") {
        (n, 0.001)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1.0)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60.0)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3600.0)
    } else {
        (s, 1.0)
    };

    let value: f64 = number.trim().parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(value * scale).ok()
}

fn duration_var(name: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).ok_or_else(|| ConfigError::Duration {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn number_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Number {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn bool_var(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Bool {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}
