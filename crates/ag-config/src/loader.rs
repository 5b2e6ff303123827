//! Configuration loader with layered file and environment variable support.
//!
//! Merge order (later wins): base file, environment-named override file,
//! `AUTHGATE_*` environment variables. Optional files that do not exist are
//! skipped.

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Base config file name
const BASE_CONFIG: &str = "authgate.toml";

/// Configuration loader
pub struct ConfigLoader {
    base_path: Option<PathBuf>,
    environment: Option<String>,
}

impl ConfigLoader {
    /// Create a loader that searches the working directory.
    pub fn new() -> Self {
        Self {
            base_path: None,
            environment: env::var("AUTHGATE_ENV").ok(),
        }
    }

    /// Create a loader with an explicit base config file path.
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            base_path: Some(path.into()),
            environment: env::var("AUTHGATE_ENV").ok(),
        }
    }

    /// Override the environment name (normally read from `AUTHGATE_ENV`).
    pub fn with_environment(mut self, env_name: impl Into<String>) -> Self {
        self.environment = Some(env_name.into());
        self
    }

    /// Load configuration, merging base file, environment override file,
    /// and environment variables.
    ///
    /// Files are merged per key: the override file only replaces the keys
    /// it actually sets, everything else keeps the base (or default) value.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let base = self
            .base_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(BASE_CONFIG));

        let mut value = if base.exists() {
            info!(path = ?base, "Loading configuration from file");
            Self::read_value(&base)?
        } else {
            toml::Value::Table(toml::map::Map::new())
        };

        // Environment-specific override file, e.g. authgate.production.toml
        if let Some(env_name) = &self.environment {
            let override_path = Self::override_path(&base, env_name);
            if override_path.exists() {
                info!(path = ?override_path, "Applying environment override file");
                Self::merge_values(&mut value, Self::read_value(&override_path)?);
            }
        }

        let mut config: AppConfig = value.try_into()?;
        self.apply_env_overrides(&mut config);

        Ok(config)
    }

    fn read_value(path: &PathBuf) -> Result<toml::Value, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(content.parse::<toml::Value>()?)
    }

    /// Deep-merge `overlay` into `base`: tables merge key by key, every
    /// other value is replaced by the overlay's.
    fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
        match (base, overlay) {
            (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
                for (key, overlay_value) in overlay_table {
                    match base_table.get_mut(&key) {
                        Some(base_value) => Self::merge_values(base_value, overlay_value),
                        None => {
                            base_table.insert(key, overlay_value);
                        }
                    }
                }
            }
            (base_value, overlay_value) => *base_value = overlay_value,
        }
    }

    fn override_path(base: &PathBuf, env_name: &str) -> PathBuf {
        let stem = base
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("authgate");
        base.with_file_name(format!("{}.{}.toml", stem, env_name.to_lowercase()))
    }

    /// Apply `AUTHGATE_*` environment variable overrides.
    fn apply_env_overrides(&self, config: &mut AppConfig) {
        // HTTP
        if let Ok(val) = env::var("AUTHGATE_HTTP_PORT") {
            if let Ok(port) = val.parse() {
                config.http.port = port;
            }
        }
        if let Ok(val) = env::var("AUTHGATE_HTTP_HOST") {
            config.http.host = val;
        }
        if let Ok(val) = env::var("AUTHGATE_STATIC_DIR") {
            config.http.static_dir = val;
        }

        // Database
        if let Ok(val) = env::var("AUTHGATE_DEFAULT_CONNECTION") {
            config.connection_strings.default_connection = val;
        }

        // Logging
        if let Ok(val) = env::var("AUTHGATE_LOG_LEVEL") {
            config.logging.level = val;
        }

        // Auth
        if let Ok(val) = env::var("AUTHGATE_AUTHORITY") {
            config.auth.authority = val;
        }
        if let Ok(val) = env::var("AUTHGATE_AUDIENCE") {
            config.auth.audience = val;
        }
        if let Ok(val) = env::var("AUTHGATE_ALLOWED_SCOPES") {
            config.auth.allowed_scopes =
                val.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(val) = env::var("AUTHGATE_ACCESS_TOKEN_EXPIRY_SECS") {
            if let Ok(secs) = val.parse() {
                config.auth.access_token_expiry_secs = secs;
            }
        }
        if let Ok(val) = env::var("AUTHGATE_MAX_FAILED_ATTEMPTS") {
            if let Ok(n) = val.parse() {
                config.auth.max_failed_attempts = n;
            }
        }
        if let Ok(val) = env::var("AUTHGATE_LOCKOUT_SECS") {
            if let Ok(secs) = val.parse() {
                config.auth.lockout_secs = secs;
            }
        }

        // General
        if let Ok(val) = env::var("AUTHGATE_DEV_MODE") {
            config.dev_mode = val.parse().unwrap_or(false);
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_base_file_falls_back_to_defaults() {
        let loader = ConfigLoader::with_path("/nonexistent/authgate.toml");
        let config = loader.load().unwrap();
        assert_eq!(config.http.port, 5000);
    }

    #[test]
    fn override_file_name_is_derived_from_base() {
        let base = PathBuf::from("/etc/authgate/authgate.toml");
        let path = ConfigLoader::override_path(&base, "Production");
        assert_eq!(
            path,
            PathBuf::from("/etc/authgate/authgate.production.toml")
        );
    }

    #[test]
    fn override_file_merges_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("authgate.toml");
        std::fs::write(
            &base,
            r#"
dev_mode = true

[connection_strings]
default_connection = "sqlite://base.db"

[logging]
level = "warn"
"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("authgate.staging.toml"),
            r#"
[logging]
level = "debug"
"#,
        )
        .unwrap();

        env::set_var("AUTHGATE_AUDIENCE", "staging-api");
        let config = ConfigLoader::with_path(&base)
            .with_environment("Staging")
            .load()
            .unwrap();
        env::remove_var("AUTHGATE_AUDIENCE");

        // Override file only touched [logging]; base keys survive
        assert!(config.dev_mode);
        assert_eq!(
            config.connection_strings.default_connection,
            "sqlite://base.db"
        );
        assert_eq!(config.logging.level, "debug");
        // Environment variables win over both files
        assert_eq!(config.auth.audience, "staging-api");
    }

    #[test]
    fn base_file_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
dev_mode = true

[http]
port = 8081
"#
        )
        .unwrap();

        let loader = ConfigLoader::with_path(file.path()).with_environment("nosuchenv");
        let config = loader.load().unwrap();
        assert!(config.dev_mode);
        assert_eq!(config.http.port, 8081);
    }
}
