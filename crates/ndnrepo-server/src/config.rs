// ABOUTME: Configuration loading and validation for the ndnrepo daemon.
// ABOUTME: Reads NDNREPO_* environment variables and applies defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use ndnrepo_core::Name;
use serde::Serialize;
use thiserror::Error;

use crate::sync_handle::DEFAULT_SESSION_GRACE;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("NDNREPO_COMMAND_PREFIX is not a valid name: {0}")]
    InvalidCommandPrefix(String),

    #[error("NDNREPO_MAX_PACKETS must be a positive integer: {0}")]
    InvalidMaxPackets(String),

    #[error("NDNREPO_STORAGE must be `sqlite` or `memory`: {0}")]
    InvalidStorage(String),

    #[error("NDNREPO_BULK_INSERT_ADDR is not a valid socket address: {0}")]
    InvalidBulkInsertAddr(String),

    #[error("NDNREPO_SESSION_GRACE_MS must be a non-negative integer: {0}")]
    InvalidSessionGrace(String),
}

/// Which Storage backend the daemon opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Sqlite,
    Memory,
}

/// Daemon configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct RepoConfig {
    pub db_dir: PathBuf,
    pub command_prefix: Name,
    pub max_packets: usize,
    pub storage: StorageKind,
    pub bulk_insert_addr: Option<SocketAddr>,
    pub session_grace: Duration,
}

impl RepoConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// Environment variables:
    /// - NDNREPO_DB_DIR: database directory (default: ~/.ndnrepo)
    /// - NDNREPO_COMMAND_PREFIX: command name prefix (default: /repo/command)
    /// - NDNREPO_MAX_PACKETS: index capacity (default: 100000)
    /// - NDNREPO_STORAGE: `sqlite` or `memory` (default: sqlite)
    /// - NDNREPO_BULK_INSERT_ADDR: TCP bulk insert address (optional, disabled when unset)
    /// - NDNREPO_SESSION_GRACE_MS: how long stopped sync sessions stay queryable (default: 10000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_dir = std::env::var("NDNREPO_DB_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::var("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("/tmp"))
                    .join(".ndnrepo")
            });

        let prefix_str =
            std::env::var("NDNREPO_COMMAND_PREFIX").unwrap_or_else(|_| "/repo/command".to_string());
        let command_prefix = Name::from_uri(&prefix_str)
            .ok()
            .filter(|name| !name.is_empty())
            .ok_or(ConfigError::InvalidCommandPrefix(prefix_str))?;

        let max_packets = match std::env::var("NDNREPO_MAX_PACKETS") {
            Ok(v) => v
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidMaxPackets(v))?,
            Err(_) => 100_000,
        };

        let storage = match std::env::var("NDNREPO_STORAGE").as_deref() {
            Ok("sqlite") | Err(_) => StorageKind::Sqlite,
            Ok("memory") => StorageKind::Memory,
            Ok(other) => return Err(ConfigError::InvalidStorage(other.to_string())),
        };

        let bulk_insert_addr = match std::env::var("NDNREPO_BULK_INSERT_ADDR") {
            Ok(v) if !v.is_empty() => Some(
                v.parse::<SocketAddr>()
                    .map_err(|_| ConfigError::InvalidBulkInsertAddr(v))?,
            ),
            _ => None,
        };

        let session_grace = match std::env::var("NDNREPO_SESSION_GRACE_MS") {
            Ok(v) => Duration::from_millis(
                v.parse::<u64>()
                    .map_err(|_| ConfigError::InvalidSessionGrace(v))?,
            ),
            Err(_) => DEFAULT_SESSION_GRACE,
        };

        Ok(Self {
            db_dir,
            command_prefix,
            max_packets,
            storage,
            bulk_insert_addr,
            session_grace,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 6] = [
        "NDNREPO_DB_DIR",
        "NDNREPO_COMMAND_PREFIX",
        "NDNREPO_MAX_PACKETS",
        "NDNREPO_STORAGE",
        "NDNREPO_BULK_INSERT_ADDR",
        "NDNREPO_SESSION_GRACE_MS",
    ];

    fn clear() {
        // SAFETY: test-only code, single-threaded test execution
        unsafe {
            for var in VARS {
                std::env::remove_var(var);
            }
        }
    }

    // Env vars are process-global, so every case runs in one test.
    #[test]
    fn config_loads_defaults_and_rejects_bad_values() {
        clear();
        let config = RepoConfig::from_env().unwrap();
        assert!(config.db_dir.to_string_lossy().contains(".ndnrepo"));
        assert_eq!(config.command_prefix, Name::from_uri("/repo/command").unwrap());
        assert_eq!(config.max_packets, 100_000);
        assert_eq!(config.storage, StorageKind::Sqlite);
        assert!(config.bulk_insert_addr.is_none());
        assert_eq!(config.session_grace, Duration::from_secs(10));

        // SAFETY: test-only code, single-threaded test execution
        unsafe {
            std::env::set_var("NDNREPO_DB_DIR", "/var/lib/ndnrepo");
            std::env::set_var("NDNREPO_STORAGE", "memory");
            std::env::set_var("NDNREPO_BULK_INSERT_ADDR", "127.0.0.1:7376");
            std::env::set_var("NDNREPO_SESSION_GRACE_MS", "250");
        }
        let config = RepoConfig::from_env().unwrap();
        assert_eq!(config.db_dir, PathBuf::from("/var/lib/ndnrepo"));
        assert_eq!(config.storage, StorageKind::Memory);
        assert_eq!(config.bulk_insert_addr, Some("127.0.0.1:7376".parse().unwrap()));
        assert_eq!(config.session_grace, Duration::from_millis(250));

        // SAFETY: test-only code, single-threaded test execution
        unsafe { std::env::set_var("NDNREPO_MAX_PACKETS", "0") };
        let err = RepoConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("NDNREPO_MAX_PACKETS"), "{}", err);

        clear();
        // SAFETY: test-only code, single-threaded test execution
        unsafe { std::env::set_var("NDNREPO_STORAGE", "rocksdb") };
        assert!(matches!(
            RepoConfig::from_env(),
            Err(ConfigError::InvalidStorage(s)) if s == "rocksdb"
        ));

        clear();
        // SAFETY: test-only code, single-threaded test execution
        unsafe { std::env::set_var("NDNREPO_COMMAND_PREFIX", "/") };
        assert!(matches!(
            RepoConfig::from_env(),
            Err(ConfigError::InvalidCommandPrefix(_))
        ));
        clear();
    }
}
