//! Configuration for the Strata server.
//!
//! All configuration is read from environment variables (a `.env` file is
//! loaded first if present). Missing or unparseable values fall back to the
//! defaults; [`Config::validate`] rejects values the server cannot run with.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("storage path must not be empty")]
    EmptyStoragePath,

    #[error("max body size must be greater than zero")]
    ZeroBodyLimit,
}

impl From<ConfigError> for strata_common::Error {
    fn from(err: ConfigError) -> Self {
        strata_common::Error::validation(err.to_string()).with_source(err)
    }
}

/// Backing store settings
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Append-only file the points are written to
    pub path: PathBuf,

    /// Rotate the file once it would grow past this many bytes (0 disables)
    pub max_file_size: u64,

    /// Where rotated files are moved to
    pub backup_dir: Option<PathBuf>,

    /// Compress rotated files with LZ4
    pub compression: bool,
}

impl StorageConfig {
    /// Backup directory, defaulting to `backups/` next to the data file.
    pub fn backup_dir(&self) -> PathBuf {
        match &self.backup_dir {
            Some(dir) => dir.clone(),
            None => self
                .path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("backups"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/points.tsv"),
            max_file_size: 0,
            backup_dir: None,
            compression: false,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server host
    pub host: String,

    /// HTTP server port
    pub port: u16,

    /// Upper bound on reading a request body
    pub read_timeout: Duration,

    /// Upper bound on handling a request end to end
    pub write_timeout: Duration,

    /// Keep-alive idle timeout
    pub idle_timeout: Duration,

    /// Default drain deadline used by the binary on SIGINT/SIGTERM
    pub shutdown_timeout: Duration,

    /// Largest accepted request body
    pub max_body_bytes: usize,

    pub storage: StorageConfig,

    /// Log level
    pub log_level: String,

    /// Enable JSON logging
    pub log_json: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let storage_defaults = StorageConfig::default();

        Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: parse_var("PORT").unwrap_or(defaults.port),
            read_timeout: secs_var("READ_TIMEOUT_SECS").unwrap_or(defaults.read_timeout),
            write_timeout: secs_var("WRITE_TIMEOUT_SECS").unwrap_or(defaults.write_timeout),
            idle_timeout: secs_var("IDLE_TIMEOUT_SECS").unwrap_or(defaults.idle_timeout),
            shutdown_timeout: secs_var("SHUTDOWN_TIMEOUT_SECS")
                .unwrap_or(defaults.shutdown_timeout),
            max_body_bytes: parse_var("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            storage: StorageConfig {
                path: env::var("STORAGE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(storage_defaults.path),
                max_file_size: parse_var("STORAGE_MAX_FILE_SIZE")
                    .unwrap_or(storage_defaults.max_file_size),
                backup_dir: env::var("STORAGE_BACKUP_DIR").ok().map(PathBuf::from),
                compression: bool_var("STORAGE_COMPRESSION").unwrap_or(false),
            },
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_json: bool_var("LOG_JSON").unwrap_or(false),
        }
    }

    /// Check the values the server depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("read timeout", self.read_timeout),
            ("write timeout", self.write_timeout),
            ("idle timeout", self.idle_timeout),
            ("shutdown timeout", self.shutdown_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration(name));
            }
        }

        if self.storage.path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyStoragePath);
        }

        if self.max_body_bytes == 0 {
            return Err(ConfigError::ZeroBodyLimit);
        }

        Ok(())
    }

    /// Get the full server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8086,
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(30),
            max_body_bytes: 10 * 1024 * 1024,
            storage: StorageConfig::default(),
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn secs_var(name: &str) -> Option<Duration> {
    parse_var::<u64>(name).map(Duration::from_secs)
}

fn bool_var(name: &str) -> Option<bool> {
    env::var(name).ok().map(|v| v == "true" || v == "1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let config = Config {
            shutdown_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroDuration("shutdown timeout"))
        );
    }

    #[test]
    fn test_rejects_empty_storage_path() {
        let mut config = Config::default();
        config.storage.path = PathBuf::new();
        assert_eq!(config.validate(), Err(ConfigError::EmptyStoragePath));
    }

    #[test]
    fn test_backup_dir_defaults_next_to_data_file() {
        let storage = StorageConfig {
            path: PathBuf::from("/var/lib/strata/points.tsv"),
            ..Default::default()
        };
        assert_eq!(storage.backup_dir(), PathBuf::from("/var/lib/strata/backups"));

        let storage = StorageConfig {
            backup_dir: Some(PathBuf::from("/mnt/archive")),
            ..storage
        };
        assert_eq!(storage.backup_dir(), PathBuf::from("/mnt/archive"));
    }

    #[test]
    fn test_server_addr() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 9000,
            ..Default::default()
        };
        assert_eq!(config.server_addr(), "127.0.0.1:9000");
    }
}
