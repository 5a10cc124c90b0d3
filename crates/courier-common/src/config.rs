//! Configuration for Courier

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Outbound SMTP configuration
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// Web UI configuration
    #[serde(default)]
    pub web: WebConfig,

    /// List cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database backend: "postgres" or "memory"
    #[serde(default = "default_db_backend")]
    pub backend: String,

    /// Database URL (for postgres)
    pub url: Option<String>,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_db_backend() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Outbound SMTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Relay host
    #[serde(default = "default_smtp_host")]
    pub host: String,

    /// Relay port
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Username for SMTP AUTH
    pub username: Option<String>,

    /// Password for SMTP AUTH
    pub password: Option<String>,

    /// Use implicit TLS
    #[serde(default)]
    pub use_tls: bool,

    /// Use STARTTLS
    #[serde(default = "default_use_starttls")]
    pub use_starttls: bool,

    /// Sender address for every outgoing message
    #[serde(default = "default_from_address")]
    pub from_address: String,

    /// Per-send timeout in seconds
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: None,
            password: None,
            use_tls: false,
            use_starttls: default_use_starttls(),
            from_address: default_from_address(),
            timeout_secs: default_smtp_timeout(),
        }
    }
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_use_starttls() -> bool {
    true
}

fn default_from_address() -> String {
    "courier@localhost.localdomain".to_string()
}

fn default_smtp_timeout() -> u64 {
    30
}

/// Web UI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Web UI server bind address
    #[serde(default = "default_web_bind")]
    pub bind: String,

    /// Session lifetime in hours
    #[serde(default = "default_session_ttl")]
    pub session_ttl_hours: i64,

    /// Mark session cookies as Secure
    #[serde(default)]
    pub secure_cookies: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: default_web_bind(),
            session_ttl_hours: default_session_ttl(),
            secure_cookies: false,
        }
    }
}

fn default_web_bind() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_session_ttl() -> i64 {
    24 * 14
}

/// List cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Serve entity lists from the in-process cache
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Seconds a cached list is served before it is reloaded
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    300
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from a file layered with `COURIER__SECTION__KEY`
    /// environment overrides. A missing file is allowed as long as the
    /// environment supplies the required keys.
    pub fn load(path: &Path) -> crate::Result<Self> {
        config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("COURIER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize::<Config>())
            .map_err(|e| crate::Error::Config(format!("Failed to load config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let smtp = SmtpConfig::default();
        assert_eq!(smtp.port, 587);
        assert!(smtp.use_starttls);

        let web = WebConfig::default();
        assert_eq!(web.bind, "0.0.0.0:8000");
        assert!(CacheConfig::default().enabled);
        assert_eq!(CacheConfig::default().ttl_secs, 300);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[database]
backend = "postgres"
url = "postgres://localhost/courier"

[smtp]
host = "smtp.example.com"
port = 465
use_tls = true
from_address = "news@example.com"

[cache]
enabled = false
"#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.database.backend, "postgres");
        assert_eq!(config.smtp.host, "smtp.example.com");
        assert_eq!(config.smtp.port, 465);
        assert_eq!(config.smtp.from_address, "news@example.com");
        assert!(!config.cache.enabled);
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_load_layers_env_over_file() {
        let path = std::env::temp_dir().join(format!("courier-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            "[database]\nbackend = \"memory\"\n\n[smtp]\nhost = \"mail.example.com\"\nport = 2525\n",
        )
        .unwrap();

        std::env::set_var("COURIER__SMTP__PORT", "465");
        let layered = Config::load(&path);
        std::env::remove_var("COURIER__SMTP__PORT");
        std::fs::remove_file(&path).unwrap();

        let config = layered.unwrap();
        assert_eq!(config.smtp.port, 465);
        assert_eq!(config.smtp.host, "mail.example.com");
        assert_eq!(config.database.backend, "memory");

        // No file at all: the environment alone must supply the database
        let missing = path.with_file_name(format!("absent-{}.toml", uuid::Uuid::new_v4()));
        std::env::set_var("COURIER__DATABASE__BACKEND", "memory");
        let env_only = Config::load(&missing);
        std::env::remove_var("COURIER__DATABASE__BACKEND");

        let config = env_only.unwrap();
        assert_eq!(config.database.backend, "memory");
        assert_eq!(config.smtp.port, 587);
    }

    #[test]
    fn test_missing_database_section() {
        let err = Config::from_toml("[smtp]\nport = 25\n").unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }
}
