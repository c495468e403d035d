//! Configuration loading, validation, and the global config singleton.
//!
//! ## Loading order
//!
//! 1. `EXPORTER_CONFIG` env var (path to a TOML file), else `exporter.toml`
//!    in the current working directory if present.
//! 2. Environment variable overrides for the handful of startup-critical
//!    secrets (base URL, auth credentials, license key).
//! 3. Built-in defaults ([`defaults`]).
//!
//! Call [`init`] exactly once at startup, then [`get`] anywhere in the
//! codebase.

pub mod defaults;

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::domain::{ChannelConfig, MonitorDefinition};
use crate::error::ConfigError;

static EXPORTER_CONFIG: OnceLock<ExporterConfig> = OnceLock::new();

/// Initialize the global exporter configuration.
///
/// Must be called exactly once before any call to [`get`]. Logs a warning
/// and leaves the existing value in place if called more than once (mirrors
/// the teacher's `config::init` idiom).
pub fn init(config: ExporterConfig) {
    if EXPORTER_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
    }
}

/// Get a reference to the global exporter configuration.
///
/// Panics if [`init`] has not been called — a missing config is a fatal
/// startup bug, not a recoverable condition.
pub fn get() -> &'static ExporterConfig {
    EXPORTER_CONFIG
        .get()
        .expect("config::get() called before config::init() — this is a startup bug")
}

pub fn is_initialized() -> bool {
    EXPORTER_CONFIG.get().is_some()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AuthConfig {
    ClientCredentials {
        client_id: String,
        client_secret: String,
    },
    Login {
        username: String,
        password: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub auto_discovery: bool,
    pub refresh_interval_ms: u64,
    /// Manual environment set used when auto-discovery is disabled.
    pub environments: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            auto_discovery: true,
            refresh_interval_ms: defaults::DISCOVERY_REFRESH_INTERVAL_MS,
            environments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub period_seconds: u64,
    pub regions: Vec<String>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: defaults::SCRAPE_INTERVAL_SECONDS,
            period_seconds: defaults::SCRAPE_PERIOD_SECONDS,
            regions: vec!["us-east-1".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_seconds: u64,
    pub read_timeout_seconds: u64,
    pub max_retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: defaults::HTTP_CONNECT_TIMEOUT_SECONDS,
            read_timeout_seconds: defaults::HTTP_READ_TIMEOUT_SECONDS,
            max_retries: defaults::HTTP_MAX_RETRIES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MonitorDefaults {
    pub cooldown_minutes: Option<i64>,
    pub evaluation_window_minutes: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorsConfig {
    pub enabled: bool,
    pub evaluation_interval_seconds: u64,
    pub defaults: MonitorDefaults,
    pub definitions: Vec<MonitorDefinition>,
    pub channels: Vec<ChannelConfig>,
}

impl Default for MonitorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            evaluation_interval_seconds: defaults::MONITOR_EVALUATION_INTERVAL_SECONDS,
            defaults: MonitorDefaults::default(),
            definitions: Vec::new(),
            channels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LicenseConfig {
    pub key: Option<String>,
}

/// SMTP mail-sender collaborator backing the Email notification channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub use_starttls: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 587,
            username: String::new(),
            password: String::new(),
            use_starttls: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    pub base_url: String,
    pub auth: AuthConfig,
    #[serde(default)]
    pub organization_id: String,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub scrape: ScrapeConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub monitors: MonitorsConfig,
    #[serde(default)]
    pub license: LicenseConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_bind_address() -> String {
    "0.0.0.0:9404".to_string()
}

impl ExporterConfig {
    /// Load configuration per the documented layering, then validate it.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("EXPORTER_CONFIG").unwrap_or_else(|_| "exporter.toml".to_string());
        let mut config = if std::path::Path::new(&path).exists() {
            let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            toml::from_str::<ExporterConfig>(&raw).map_err(|source| ConfigError::Parse { path, source })?
        } else {
            return Err(ConfigError::Missing(format!(
                "no config file found at {path} and EXPORTER_CONFIG was not set"
            )));
        };

        apply_env_overrides(&mut config);
        merge_monitor_defaults(&mut config);
        validate(&config)?;
        Ok(config)
    }

    /// Monitor channels that passed [`ChannelConfig::is_configured`] and are
    /// enabled. Misconfigured channels were already logged and excluded at
    /// startup.
    pub fn configured_channels(&self) -> HashMap<String, ChannelConfig> {
        self.monitors
            .channels
            .iter()
            .filter(|c| c.enabled() && c.is_configured())
            .map(|c| (c.name().to_string(), c.clone()))
            .collect()
    }
}

fn apply_env_overrides(config: &mut ExporterConfig) {
    if let Ok(v) = std::env::var("EXPORTER_BASE_URL") {
        config.base_url = v;
    }
    if let Ok(v) = std::env::var("EXPORTER_ORGANIZATION_ID") {
        config.organization_id = v;
    }
    if let Ok(v) = std::env::var("EXPORTER_LICENSE_KEY") {
        config.license.key = Some(v);
    }
    if let Ok(v) = std::env::var("EXPORTER_BIND_ADDRESS") {
        config.bind_address = v;
    }
}

fn merge_monitor_defaults(config: &mut ExporterConfig) {
    let defaults = config.monitors.defaults.clone();
    for def in &mut config.monitors.definitions {
        if def.cooldown_minutes.is_none() {
            def.cooldown_minutes = defaults.cooldown_minutes;
        }
        if def.evaluation_window_minutes.is_none() {
            def.evaluation_window_minutes = defaults.evaluation_window_minutes;
        }
    }
}

fn validate(config: &ExporterConfig) -> Result<(), ConfigError> {
    if config.base_url.trim().is_empty() {
        return Err(ConfigError::Missing("baseUrl".to_string()));
    }
    match &config.auth {
        AuthConfig::ClientCredentials {
            client_id,
            client_secret,
        } => {
            if client_id.trim().is_empty() || client_secret.trim().is_empty() {
                return Err(ConfigError::Missing(
                    "auth.clientId / auth.clientSecret".to_string(),
                ));
            }
        }
        AuthConfig::Login { username, password } => {
            if username.trim().is_empty() || password.trim().is_empty() {
                return Err(ConfigError::Missing("auth.username / auth.password".to_string()));
            }
        }
    }
    if config.scrape.interval_seconds < defaults::SCRAPE_INTERVAL_SECONDS_MIN {
        return Err(ConfigError::Invalid(format!(
            "scrape.intervalSeconds must be >= {}",
            defaults::SCRAPE_INTERVAL_SECONDS_MIN
        )));
    }
    if config.scrape.period_seconds < defaults::SCRAPE_PERIOD_SECONDS_MIN {
        return Err(ConfigError::Invalid(format!(
            "scrape.periodSeconds must be >= {}",
            defaults::SCRAPE_PERIOD_SECONDS_MIN
        )));
    }
    if config.monitors.enabled
        && config.monitors.evaluation_interval_seconds < defaults::MONITOR_EVALUATION_INTERVAL_SECONDS_MIN
    {
        return Err(ConfigError::Invalid(format!(
            "monitors.evaluationIntervalSeconds must be >= {}",
            defaults::MONITOR_EVALUATION_INTERVAL_SECONDS_MIN
        )));
    }

    let channel_names: std::collections::HashSet<&str> =
        config.monitors.channels.iter().map(|c| c.name()).collect();
    for def in &config.monitors.definitions {
        for channel in &def.channels {
            if !channel_names.contains(channel.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "monitor '{}' references unconfigured channel '{}'",
                    def.name, channel
                )));
            }
        }
    }

    for channel in &config.monitors.channels {
        if channel.enabled() && !channel.is_configured() {
            tracing::warn!(
                channel = channel.name(),
                channel_type = channel.type_name(),
                "channel is missing mandatory fields — excluding from dispatch"
            );
        }
    }

    Ok(())
}

/// Mask a sensitive identifier for `/actuator/health`'s configuration
/// fingerprint: first 4 + `***` + last 4 characters when the value is at
/// least 8 characters long, else `***`.
pub fn mask_sensitive(value: &str) -> String {
    if value.len() >= 8 {
        let chars: Vec<char> = value.chars().collect();
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}***{tail}")
    } else {
        "***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_short_values_fully() {
        assert_eq!(mask_sensitive("abc"), "***");
        assert_eq!(mask_sensitive("1234567"), "***");
    }

    #[test]
    fn masks_long_values_partially() {
        assert_eq!(mask_sensitive("abcdefgh"), "abcd***efgh");
        assert_eq!(mask_sensitive("sk-1234567890"), "sk-1***7890");
    }

    #[test]
    fn validate_rejects_scrape_interval_below_minimum() {
        let mut cfg = sample_config();
        cfg.scrape.interval_seconds = 5;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn validate_rejects_monitor_referencing_unknown_channel() {
        let mut cfg = sample_config();
        cfg.monitors.definitions.push(crate::domain::MonitorDefinition {
            name: "m1".into(),
            monitor_type: crate::domain::MonitorType::QueueDepth,
            target: "*".into(),
            condition: crate::domain::ThresholdCondition::Gt,
            threshold: 100.0,
            evaluation_window_minutes: None,
            cooldown_minutes: None,
            severity: crate::domain::Severity::Warning,
            channels: vec!["missing-channel".into()],
            enabled: true,
        });
        assert!(validate(&cfg).is_err());
    }

    fn sample_config() -> ExporterConfig {
        ExporterConfig {
            base_url: "https://example.com".to_string(),
            auth: AuthConfig::ClientCredentials {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
            },
            organization_id: String::new(),
            discovery: DiscoveryConfig::default(),
            scrape: ScrapeConfig::default(),
            http: HttpConfig::default(),
            monitors: MonitorsConfig::default(),
            license: LicenseConfig::default(),
            smtp: SmtpConfig::default(),
            bind_address: default_bind_address(),
        }
    }
}
