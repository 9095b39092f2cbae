//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, FixedOffset, Local, Offset};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{Metric, RiskLevel};

/// Environment variable consulted when `portal.username` is empty.
pub const USERNAME_ENV: &str = "PORTWATCH_USERNAME";

/// Environment variable consulted when `portal.password` is empty.
pub const PASSWORD_ENV: &str = "PORTWATCH_PASSWORD";

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Portal endpoints and HTTP client settings
    #[serde(default)]
    pub portal: PortalConfig,

    /// Credential lifecycle settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Transport retry settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Risk classification settings
    #[serde(default)]
    pub risk: RiskConfig,

    /// Raw bulletin storage
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.portal.user_agent.trim().is_empty() {
            return Err(AppError::validation("portal.user_agent is empty"));
        }
        if self.portal.timeout_secs == 0 {
            return Err(AppError::validation("portal.timeout_secs must be > 0"));
        }
        if !self.portal.bulletin_url.contains("{station}") {
            return Err(AppError::validation(
                "portal.bulletin_url must contain a {station} placeholder",
            ));
        }
        url::Url::parse(&self.portal.bulletin_url.replace("{station}", "0"))?;
        url::Url::parse(&self.portal.probe_url)?;

        if self.session.ttl_hours == 0 {
            return Err(AppError::validation("session.ttl_hours must be > 0"));
        }
        if self.session.login_timeout_secs == 0 {
            return Err(AppError::validation(
                "session.login_timeout_secs must be > 0",
            ));
        }
        if self.session.login_attempts == 0 {
            return Err(AppError::validation("session.login_attempts must be > 0"));
        }
        if self.session.token_header.trim().is_empty() {
            return Err(AppError::validation("session.token_header is empty"));
        }
        if self.fetch.max_attempts == 0 {
            return Err(AppError::validation("fetch.max_attempts must be > 0"));
        }

        for profile in &self.risk.profiles {
            profile.validate()?;
        }
        self.risk.active_profile()?.validate()?;
        Ok(())
    }
}

/// Portal endpoints and HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Bulletin endpoint; `{station}` is replaced by the port's station id
    #[serde(default = "defaults::bulletin_url")]
    pub bulletin_url: String,

    /// Protected endpoint used to check that a session is still live
    #[serde(default = "defaults::probe_url")]
    pub probe_url: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Portal account; falls back to `PORTWATCH_USERNAME`
    #[serde(default)]
    pub username: String,

    /// Portal password; falls back to `PORTWATCH_PASSWORD`
    #[serde(default)]
    pub password: String,
}

impl PortalConfig {
    /// Bulletin URL for a station.
    pub fn bulletin_url_for(&self, station_id: &str) -> String {
        self.bulletin_url.replace("{station}", station_id)
    }

    /// Resolve the login credentials, consulting the environment for empty fields.
    pub fn credentials(&self) -> Result<(String, String)> {
        let username = non_empty_or_env(&self.username, USERNAME_ENV).ok_or_else(|| {
            AppError::config(format!(
                "portal.username is empty and {} is unset",
                USERNAME_ENV
            ))
        })?;
        let password = non_empty_or_env(&self.password, PASSWORD_ENV).ok_or_else(|| {
            AppError::config(format!(
                "portal.password is empty and {} is unset",
                PASSWORD_ENV
            ))
        })?;
        Ok((username, password))
    }
}

fn non_empty_or_env(value: &str, var: &str) -> Option<String> {
    if !value.trim().is_empty() {
        return Some(value.to_string());
    }
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            bulletin_url: defaults::bulletin_url(),
            probe_url: defaults::probe_url(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            username: String::new(),
            password: String::new(),
        }
    }
}

/// Credential lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Where the credential bundle is persisted between runs
    #[serde(default = "defaults::cache_path")]
    pub cache_path: PathBuf,

    /// Age after which a bundle is re-authenticated without probing
    #[serde(default = "defaults::ttl_hours")]
    pub ttl_hours: u64,

    /// Upper bound for one interactive login attempt
    #[serde(default = "defaults::login_timeout")]
    pub login_timeout_secs: u64,

    /// Interactive login attempts per authentication
    #[serde(default = "defaults::login_attempts")]
    pub login_attempts: u32,

    /// Header carrying the token
    #[serde(default = "defaults::token_header")]
    pub token_header: String,

    /// Prefix prepended to the token value
    #[serde(default = "defaults::token_prefix")]
    pub token_prefix: String,

    /// External login helper: program followed by its arguments
    #[serde(default)]
    pub login_command: Vec<String>,
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::hours(self.ttl_hours as i64)
    }

    pub fn login_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.login_timeout_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_path: defaults::cache_path(),
            ttl_hours: defaults::ttl_hours(),
            login_timeout_secs: defaults::login_timeout(),
            login_attempts: defaults::login_attempts(),
            token_header: defaults::token_header(),
            token_prefix: defaults::token_prefix(),
            login_command: Vec::new(),
        }
    }
}

/// Transport retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Attempts per request for transient failures
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay; doubles on each retry
    #[serde(default = "defaults::backoff_base")]
    pub backoff_base_ms: u64,

    /// Delay between ports in a cycle
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,
}

impl FetchConfig {
    /// Backoff before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> std::time::Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        std::time::Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            backoff_base_ms: defaults::backoff_base(),
            request_delay_ms: defaults::request_delay(),
        }
    }
}

/// Raw bulletin storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "defaults::storage_root")]
    pub root_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: defaults::storage_root(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

/// Risk classification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Active threshold profile name
    #[serde(default = "defaults::profile")]
    pub profile: String,

    /// Offset used for local civil times; the host offset at start-up when unset
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,

    /// Custom profiles; a custom profile shadows a built-in one of the same name
    #[serde(default)]
    pub profiles: Vec<ThresholdProfile>,
}

impl RiskConfig {
    /// Resolve a profile by name, custom profiles first.
    pub fn find_profile(&self, name: &str) -> Option<ThresholdProfile> {
        self.profiles
            .iter()
            .find(|p| p.name == name)
            .cloned()
            .or_else(|| ThresholdProfile::builtin(name))
    }

    pub fn active_profile(&self) -> Result<ThresholdProfile> {
        self.find_profile(&self.profile).ok_or_else(|| {
            AppError::config(format!("Unknown risk profile: {}", self.profile))
        })
    }

    /// Fixed offset for local civil times.
    pub fn local_offset(&self) -> Result<FixedOffset> {
        match self.utc_offset_minutes {
            Some(minutes) => FixedOffset::east_opt(minutes * 60).ok_or_else(|| {
                AppError::config(format!("risk.utc_offset_minutes out of range: {}", minutes))
            }),
            None => Ok(Local::now().offset().fix()),
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            profile: defaults::profile(),
            utc_offset_minutes: None,
            profiles: Vec::new(),
        }
    }
}

/// Ascending caution / warning / danger cut-offs for one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tiers {
    pub caution: f64,
    pub warning: f64,
    pub danger: f64,
}

impl Tiers {
    pub const fn new(caution: f64, warning: f64, danger: f64) -> Self {
        Self {
            caution,
            warning,
            danger,
        }
    }

    /// Highest tier whose cut-off `value` reaches.
    pub fn level_for(&self, value: f64) -> RiskLevel {
        if value >= self.danger {
            RiskLevel::Danger
        } else if value >= self.warning {
            RiskLevel::Warning
        } else if value >= self.caution {
            RiskLevel::Caution
        } else {
            RiskLevel::Safe
        }
    }

    /// Cut-off for a non-safe level.
    pub fn threshold(&self, level: RiskLevel) -> Option<f64> {
        match level {
            RiskLevel::Safe => None,
            RiskLevel::Caution => Some(self.caution),
            RiskLevel::Warning => Some(self.warning),
            RiskLevel::Danger => Some(self.danger),
        }
    }
}

/// Named set of thresholds for the three monitored metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdProfile {
    pub name: String,
    /// Knots
    pub wind_speed: Tiers,
    /// Knots
    pub wind_gust: Tiers,
    /// Meters
    pub wave_height: Tiers,
}

impl ThresholdProfile {
    pub const DASHBOARD: &'static str = "dashboard";
    pub const MONITOR: &'static str = "monitor";

    /// Thresholds used by the operator dashboard. Default profile.
    pub fn dashboard() -> Self {
        Self {
            name: Self::DASHBOARD.to_string(),
            wind_speed: Tiers::new(25.0, 34.0, 48.0),
            wind_gust: Tiers::new(35.0, 45.0, 55.0),
            wave_height: Tiers::new(2.5, 4.0, 6.0),
        }
    }

    /// Tighter thresholds used by the unattended monitoring job.
    pub fn monitor() -> Self {
        Self {
            name: Self::MONITOR.to_string(),
            wind_speed: Tiers::new(22.0, 28.0, 34.0),
            wind_gust: Tiers::new(28.0, 34.0, 41.0),
            wave_height: Tiers::new(2.0, 3.0, 4.0),
        }
    }

    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            Self::DASHBOARD => Some(Self::dashboard()),
            Self::MONITOR => Some(Self::monitor()),
            _ => None,
        }
    }

    pub fn tiers(&self, metric: Metric) -> &Tiers {
        match metric {
            Metric::WindSpeed => &self.wind_speed,
            Metric::WindGust => &self.wind_gust,
            Metric::WaveHeight => &self.wave_height,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for metric in [Metric::WindSpeed, Metric::WindGust, Metric::WaveHeight] {
            let t = self.tiers(metric);
            let ascending = t.caution >= 0.0 && t.caution < t.warning && t.warning < t.danger;
            if !ascending {
                return Err(AppError::validation(format!(
                    "Profile '{}': {} thresholds must be non-negative and strictly ascending ({} / {} / {})",
                    self.name,
                    metric.label(),
                    t.caution,
                    t.warning,
                    t.danger
                )));
            }
        }
        Ok(())
    }
}

impl Default for ThresholdProfile {
    fn default() -> Self {
        Self::dashboard()
    }
}

mod defaults {
    use std::path::PathBuf;

    // Portal defaults
    pub fn bulletin_url() -> String {
        "https://marine.example.org/api/bulletin/{station}".into()
    }
    pub fn probe_url() -> String {
        "https://marine.example.org/api/user/profile".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; portwatch/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    // Session defaults
    pub fn cache_path() -> PathBuf {
        PathBuf::from("data/session.json")
    }
    pub fn ttl_hours() -> u64 {
        24
    }
    pub fn login_timeout() -> u64 {
        45
    }
    pub fn login_attempts() -> u32 {
        2
    }
    pub fn token_header() -> String {
        "X-Auth-Token".into()
    }
    pub fn token_prefix() -> String {
        "Bearer ".into()
    }

    // Fetch defaults
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn backoff_base() -> u64 {
        1000
    }
    pub fn request_delay() -> u64 {
        500
    }

    // Storage defaults
    pub fn storage_root() -> PathBuf {
        PathBuf::from("data/store")
    }

    pub fn log_level() -> String {
        "info".into()
    }

    pub fn profile() -> String {
        super::ThresholdProfile::DASHBOARD.into()
    }
}
