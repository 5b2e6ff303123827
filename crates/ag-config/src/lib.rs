//! AuthGate Configuration System
//!
//! TOML-based configuration merged from a base file, an optional
//! environment-named override file, and `AUTHGATE_*` environment variables.
//! Later sources win per key.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub connection_strings: ConnectionStrings,
    pub logging: LoggingConfig,
    pub auth: AuthSettings,

    /// Enable development mode (seeds a default admin account)
    pub dev_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            connection_strings: ConnectionStrings::default(),
            logging: LoggingConfig::default(),
            auth: AuthSettings::default(),
            dev_mode: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    /// The connection string the identity store requires.
    ///
    /// Missing config files fail softly, but database access without a
    /// connection string is a hard startup error.
    pub fn require_connection_string(&self) -> Result<&str, ConfigError> {
        let cs = self.connection_strings.default_connection.trim();
        if cs.is_empty() {
            return Err(ConfigError::ValidationError(
                "connection_strings.default_connection is not set".to_string(),
            ));
        }
        Ok(cs)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub host: String,
    /// Directory served for default-file fallback (index.html)
    pub static_dir: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            host: "0.0.0.0".to_string(),
            static_dir: "./wwwroot".to_string(),
        }
    }
}

/// Named database connection strings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionStrings {
    pub default_connection: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Token authority settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Issuer / authority base URL for issued tokens
    pub authority: String,

    /// Audience claim for access tokens
    pub audience: String,

    /// Scopes the API accepts on inbound bearer tokens
    pub allowed_scopes: Vec<String>,

    /// Access token lifetime in seconds
    pub access_token_expiry_secs: i64,

    /// Session cookie lifetime in seconds
    pub session_expiry_secs: i64,

    /// Failed login attempts before lockout
    pub max_failed_attempts: u32,

    /// Lockout window in seconds after too many failures
    pub lockout_secs: i64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            authority: "http://localhost:5000/".to_string(),
            audience: "authgate".to_string(),
            allowed_scopes: vec!["WebAPI".to_string()],
            access_token_expiry_secs: 3600,
            session_expiry_secs: 28800,
            max_failed_attempts: 5,
            lockout_secs: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_use_local_authority() {
        let config = AppConfig::default();
        assert_eq!(config.auth.authority, "http://localhost:5000/");
        assert_eq!(config.auth.allowed_scopes, vec!["WebAPI".to_string()]);
        assert_eq!(config.http.port, 5000);
    }

    #[test]
    fn missing_connection_string_is_a_hard_error() {
        let config = AppConfig::default();
        assert!(config.require_connection_string().is_err());

        let mut config = config;
        config.connection_strings.default_connection = "sqlite://authgate.db".to_string();
        assert_eq!(
            config.require_connection_string().unwrap(),
            "sqlite://authgate.db"
        );
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[connection_strings]
default_connection = "sqlite://test.db"

[logging]
level = "debug"
"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.connection_strings.default_connection, "sqlite://test.db");
        assert_eq!(config.logging.level, "debug");
        // Untouched sections keep their defaults
        assert_eq!(config.http.port, 5000);
    }
}
