//! Pool settings and configuration loading

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use super::defaults;
use super::ConnectionParams;
use crate::error::{Error, Result};

/// Sizing and timing of a connection pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Connections opened up front and kept through idle eviction
    #[serde(default = "default_min_connections")]
    pub min_connections: usize,

    /// Upper bound on live connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// How long `acquire` waits; 0 waits forever
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Idle lifetime before eviction; 0 disables eviction
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

// Default value functions for serde
fn default_min_connections() -> usize {
    defaults::MIN_CONNECTIONS
}
fn default_max_connections() -> usize {
    defaults::MAX_CONNECTIONS
}
fn default_acquire_timeout_ms() -> u64 {
    defaults::ACQUIRE_TIMEOUT_MS
}
fn default_idle_timeout_ms() -> u64 {
    defaults::IDLE_TIMEOUT_MS
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

impl PoolSettings {
    /// `None` when acquire should wait indefinitely.
    pub fn acquire_timeout(&self) -> Option<Duration> {
        (self.acquire_timeout_ms > 0).then(|| Duration::from_millis(self.acquire_timeout_ms))
    }

    /// `None` when idle eviction is disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }

    /// Check `0 < min_connections <= max_connections`.
    pub fn validate(&self) -> Result<()> {
        if self.min_connections == 0 {
            return Err(Error::Config(
                "min_connections must be at least 1".into(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(Error::Config(format!(
                "min_connections ({}) must not exceed max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        Ok(())
    }
}

/// Complete configuration: where to connect and how to pool.
///
/// ```toml
/// [connection]
/// driver = "sqlite"
/// database = "app.db"
///
/// [pool]
/// min_connections = 2
/// max_connections = 8
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub connection: ConnectionParams,

    #[serde(default)]
    pub pool: PoolSettings,
}

impl Settings {
    /// Load settings from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let settings: Settings = toml::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        Ok(settings)
    }

    /// Load settings using config-rs (file + environment variables)
    ///
    /// Without an explicit path, an optional `llamadb.toml` in the working
    /// directory is read. Environment variables such as
    /// `LLAMADB__POOL__MAX_CONNECTIONS=20` override file values.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path));
        } else {
            builder = builder.add_source(File::with_name("llamadb").required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("LLAMADB")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.pool.validate()?;
        if self.connection.port == Some(0) {
            return Err(Error::Config("port must not be 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverKind;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.pool.min_connections, 1);
        assert_eq!(settings.pool.max_connections, 10);
        assert_eq!(settings.pool.acquire_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(settings.connection.driver, DriverKind::Sqlite);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_zero_timeouts_disable() {
        let pool = PoolSettings {
            acquire_timeout_ms: 0,
            idle_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(pool.acquire_timeout(), None);
        assert_eq!(pool.idle_timeout(), None);
    }

    #[test]
    fn test_validation_rejects_bad_sizing() {
        let zero = PoolSettings {
            min_connections: 0,
            ..Default::default()
        };
        assert!(matches!(zero.validate(), Err(Error::Config(_))));

        let inverted = PoolSettings {
            min_connections: 5,
            max_connections: 2,
            ..Default::default()
        };
        assert!(matches!(inverted.validate(), Err(Error::Config(msg)) if msg.contains("(5)")));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [connection]
            driver = "sqlite"
            database = "/tmp/app.db"
            autocommit = true

            [pool]
            max_connections = 4
            "#
        )
        .unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.connection.database.as_deref(), Some("/tmp/app.db"));
        assert!(settings.connection.autocommit);
        assert_eq!(settings.pool.max_connections, 4);
        assert_eq!(settings.pool.min_connections, 1);
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pool]\nmax_connections = \"lots\"").unwrap();
        match Settings::from_file(file.path()) {
            Err(Error::Config(msg)) => {
                assert!(msg.contains(&file.path().display().to_string()), "{}", msg);
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }
}
