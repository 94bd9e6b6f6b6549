//! Configuration management
//!
//! This module handles loading and parsing configuration for the newsroom service.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Session configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// Outbound mail configuration
    #[serde(default)]
    pub mail: MailConfig,
    /// Social announcement configuration
    #[serde(default)]
    pub social: SocialConfig,
    /// Publish notification fan-out limits
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Upper bound on pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    "data/newsroom.db".to_string()
}

fn default_max_connections() -> u32 {
    20
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Days until a login session expires
    #[serde(default = "default_session_days")]
    pub expiration_days: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiration_days: default_session_days(),
        }
    }
}

fn default_session_days() -> i64 {
    7
}

/// SMTP settings for subscriber notifications.
///
/// When `enabled` is false notifications are written to the log instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: String,
    #[serde(default)]
    pub smtp_password: String,
    #[serde(default = "default_from_address")]
    pub from_address: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_address: default_from_address(),
        }
    }
}

fn default_smtp_port() -> u16 {
    465
}

fn default_from_address() -> String {
    "newsroom@localhost".to_string()
}

/// Credentials for posting publish announcements to the social feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_social_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub access_token_secret: String,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_social_endpoint(),
            api_key: String::new(),
            api_secret: String::new(),
            access_token: String::new(),
            access_token_secret: String::new(),
        }
    }
}

fn default_social_endpoint() -> String {
    "https://api.twitter.com/2/tweets".to_string()
}

/// Limits applied to the publish notification fan-out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Timeout for a single delivery attempt, in milliseconds
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
    /// Deadline for the whole fan-out, in milliseconds
    #[serde(default = "default_total_budget_ms")]
    pub total_budget_ms: u64,
    /// Maximum deliveries in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_ms: default_attempt_timeout_ms(),
            total_budget_ms: default_total_budget_ms(),
            concurrency: default_concurrency(),
        }
    }
}

impl NotifyConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn total_budget(&self) -> Duration {
        Duration::from_millis(self.total_budget_ms)
    }
}

fn default_attempt_timeout_ms() -> u64 {
    5_000
}

fn default_total_budget_ms() -> u64 {
    30_000
}

fn default_concurrency() -> usize {
    8
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern `NEWSROOM_<SECTION>_<KEY>`:
    /// - NEWSROOM_SERVER_HOST, NEWSROOM_SERVER_PORT, NEWSROOM_SERVER_CORS_ORIGIN
    /// - NEWSROOM_DATABASE_DRIVER, NEWSROOM_DATABASE_URL
    /// - NEWSROOM_MAIL_ENABLED, NEWSROOM_MAIL_SMTP_HOST, NEWSROOM_MAIL_SMTP_PORT,
    ///   NEWSROOM_MAIL_SMTP_USERNAME, NEWSROOM_MAIL_SMTP_PASSWORD, NEWSROOM_MAIL_FROM_ADDRESS
    /// - NEWSROOM_SOCIAL_ENABLED, NEWSROOM_SOCIAL_API_KEY, NEWSROOM_SOCIAL_API_SECRET,
    ///   NEWSROOM_SOCIAL_ACCESS_TOKEN, NEWSROOM_SOCIAL_ACCESS_TOKEN_SECRET
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the service misbehave at runtime
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database.url must not be empty".to_string(),
            ));
        }
        if self.mail.enabled && self.mail.smtp_host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "mail.smtp_host is required when mail is enabled".to_string(),
            ));
        }
        if self.social.enabled
            && (self.social.api_key.is_empty()
                || self.social.api_secret.is_empty()
                || self.social.access_token.is_empty()
                || self.social.access_token_secret.is_empty())
        {
            return Err(ConfigError::ValidationError(
                "social credentials are required when social announcements are enabled"
                    .to_string(),
            ));
        }
        if self.notify.concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "notify.concurrency must be at least 1".to_string(),
            ));
        }
        if self.notify.attempt_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "notify.attempt_timeout_ms must be at least 1".to_string(),
            ));
        }
        if self.notify.total_budget_ms == 0 {
            return Err(ConfigError::ValidationError(
                "notify.total_budget_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("NEWSROOM_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse::<u16>("NEWSROOM_SERVER_PORT") {
            self.server.port = port;
        }
        if let Ok(cors_origin) = std::env::var("NEWSROOM_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        if let Ok(driver) = std::env::var("NEWSROOM_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("NEWSROOM_DATABASE_URL") {
            self.database.url = url;
        }

        if let Some(enabled) = env_parse::<bool>("NEWSROOM_MAIL_ENABLED") {
            self.mail.enabled = enabled;
        }
        if let Ok(host) = std::env::var("NEWSROOM_MAIL_SMTP_HOST") {
            self.mail.smtp_host = host;
        }
        if let Some(port) = env_parse::<u16>("NEWSROOM_MAIL_SMTP_PORT") {
            self.mail.smtp_port = port;
        }
        if let Ok(username) = std::env::var("NEWSROOM_MAIL_SMTP_USERNAME") {
            self.mail.smtp_username = username;
        }
        if let Ok(password) = std::env::var("NEWSROOM_MAIL_SMTP_PASSWORD") {
            self.mail.smtp_password = password;
        }
        if let Ok(from) = std::env::var("NEWSROOM_MAIL_FROM_ADDRESS") {
            self.mail.from_address = from;
        }

        if let Some(enabled) = env_parse::<bool>("NEWSROOM_SOCIAL_ENABLED") {
            self.social.enabled = enabled;
        }
        if let Ok(key) = std::env::var("NEWSROOM_SOCIAL_API_KEY") {
            self.social.api_key = key;
        }
        if let Ok(secret) = std::env::var("NEWSROOM_SOCIAL_API_SECRET") {
            self.social.api_secret = secret;
        }
        if let Ok(token) = std::env::var("NEWSROOM_SOCIAL_ACCESS_TOKEN") {
            self.social.access_token = token;
        }
        if let Ok(secret) = std::env::var("NEWSROOM_SOCIAL_ACCESS_TOKEN_SECRET") {
            self.social.access_token_secret = secret;
        }
    }
}

/// Parse an environment variable, ignoring it when absent or malformed
fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test that touches NEWSROOM_* variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn any_positive_notify_limits_are_accepted(
            attempt in 1u64..60_000,
            budget in 1u64..600_000,
            concurrency in 1usize..64,
        ) {
            let yaml = format!(
                "notify:\n  attempt_timeout_ms: {}\n  total_budget_ms: {}\n  concurrency: {}\n",
                attempt, budget, concurrency
            );
            let config: Config = serde_yaml::from_str(&yaml).unwrap();
            prop_assert_eq!(config.notify.attempt_timeout_ms, attempt);
            prop_assert_eq!(config.notify.total_budget_ms, budget);
            prop_assert_eq!(config.notify.concurrency, concurrency);
            prop_assert!(config.validate().is_ok());
        }
    }
}
