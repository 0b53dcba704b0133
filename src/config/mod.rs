use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::engine::sla::MAX_WINDOW_HOURS;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub registration: RegistrationConfig,
    #[serde(default)]
    pub sla: SlaConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            api_port: default_api_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Lifetime of a login session in hours
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: default_session_ttl_hours(),
        }
    }
}

fn default_session_ttl_hours() -> i64 {
    24 * 7
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationConfig {
    /// How long a verification code stays valid
    #[serde(default = "default_otp_ttl_minutes")]
    pub otp_ttl_minutes: i64,
    /// How long an unverified registration is kept before it is purged
    #[serde(default = "default_pending_retention_minutes")]
    pub pending_retention_minutes: i64,
    /// Wrong codes accepted before a code is burned and must be resent
    #[serde(default = "default_max_verification_attempts")]
    pub max_verification_attempts: i64,
    /// Interval of the background purge task in seconds
    #[serde(default = "default_purge_interval_seconds")]
    pub purge_interval_seconds: u64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            otp_ttl_minutes: default_otp_ttl_minutes(),
            pending_retention_minutes: default_pending_retention_minutes(),
            max_verification_attempts: default_max_verification_attempts(),
            purge_interval_seconds: default_purge_interval_seconds(),
        }
    }
}

fn default_otp_ttl_minutes() -> i64 {
    10
}

fn default_max_verification_attempts() -> i64 {
    5
}

fn default_pending_retention_minutes() -> i64 {
    60
}

fn default_purge_interval_seconds() -> u64 {
    300
}

/// Resolution window per ticket priority, in hours.
#[derive(Debug, Clone, Deserialize)]
pub struct SlaConfig {
    #[serde(default = "default_urgent_hours")]
    pub urgent_hours: i64,
    #[serde(default = "default_high_hours")]
    pub high_hours: i64,
    #[serde(default = "default_medium_hours")]
    pub medium_hours: i64,
    #[serde(default = "default_low_hours")]
    pub low_hours: i64,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            urgent_hours: default_urgent_hours(),
            high_hours: default_high_hours(),
            medium_hours: default_medium_hours(),
            low_hours: default_low_hours(),
        }
    }
}

fn default_urgent_hours() -> i64 {
    4
}

fn default_high_hours() -> i64 {
    24
}

fn default_medium_hours() -> i64 {
    72
}

fn default_low_hours() -> i64 {
    168
}

/// SMTP settings for system email (verification codes, review decisions)
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    #[serde(default = "default_smtp_tls")]
    pub smtp_tls: bool,
    pub from_address: Option<String>,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        self.smtp_host.is_some() && self.from_address.is_some()
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            smtp_tls: default_smtp_tls(),
            from_address: None,
            from_name: default_from_name(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_tls() -> bool {
    true
}

fn default_from_name() -> String {
    "Grievance Desk".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    /// Requests per window for authenticated API endpoints
    #[serde(default = "default_api_requests")]
    pub api_requests_per_window: u32,
    /// Requests per window for registration, verification and login
    #[serde(default = "default_auth_requests")]
    pub auth_requests_per_window: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            api_requests_per_window: default_api_requests(),
            auth_requests_per_window: default_auth_requests(),
            window_seconds: default_window_seconds(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_api_requests() -> u32 {
    120
}

fn default_auth_requests() -> u32 {
    20
}

fn default_window_seconds() -> u64 {
    60
}

fn default_cleanup_interval() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)?
        } else {
            info!("No config file found, using defaults");
            Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse configuration file")
    }

    /// Reject settings the workflows cannot run with
    pub fn validate(&self) -> Result<()> {
        let sla = &self.sla;
        if sla.urgent_hours <= 0 {
            bail!("sla.urgent_hours must be positive");
        }
        if !(sla.urgent_hours < sla.high_hours
            && sla.high_hours < sla.medium_hours
            && sla.medium_hours < sla.low_hours)
        {
            bail!("sla windows must shrink as priority rises (urgent < high < medium < low)");
        }
        if sla.low_hours > MAX_WINDOW_HOURS {
            bail!("sla.low_hours must not exceed {} (ten years)", MAX_WINDOW_HOURS);
        }
        if self.registration.otp_ttl_minutes <= 0 {
            bail!("registration.otp_ttl_minutes must be positive");
        }
        if self.registration.pending_retention_minutes < self.registration.otp_ttl_minutes {
            bail!("registration.pending_retention_minutes must cover the OTP lifetime");
        }
        if self.registration.pending_retention_minutes > MAX_WINDOW_HOURS * 60 {
            bail!("registration.pending_retention_minutes is too large");
        }
        if self.registration.max_verification_attempts <= 0 {
            bail!("registration.max_verification_attempts must be positive");
        }
        if self.auth.session_ttl_hours <= 0 {
            bail!("auth.session_ttl_hours must be positive");
        }
        if self.auth.session_ttl_hours > MAX_WINDOW_HOURS {
            bail!("auth.session_ttl_hours is too large");
        }
        Ok(())
    }
}
