//! Configuration
//!
//! Cache and WebDAV settings read from an optional JSON file and overridden
//! by `DAVCACHE_*` environment variables.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::CacheSettings;
use crate::webdav::ClientOptions;

/// Smallest capacity the cache may be configured with
pub const MIN_CAPACITY_GIGABYTES: u64 = 50;

/// Largest capacity the cache may be configured with
pub const MAX_CAPACITY_GIGABYTES: u64 = 1000;

const KILOBYTES_PER_GIGABYTE: u64 = 1024 * 1024;

/// Cache and remote store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// Base URL standard paths are appended to
    pub webdav_base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Idle connections kept per host
    pub max_connections_per_host: usize,
    /// Requests allowed in flight at once
    pub max_total_connections: usize,
    /// Parent of the hidden cache root (platform cache dir when unset)
    pub cache_parent_directory: Option<PathBuf>,
    /// Requested capacity, clamped to [50, 1000]
    pub capacity_gigabytes: u64,
    pub cache_disabled: bool,
    pub transfer_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub directory_fetch_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            webdav_base_url: "http://localhost/WebDAV".to_string(),
            username: None,
            password: None,
            max_connections_per_host: 100,
            max_total_connections: 100,
            cache_parent_directory: None,
            capacity_gigabytes: MIN_CAPACITY_GIGABYTES,
            cache_disabled: false,
            transfer_timeout_secs: 600,
            connect_timeout_secs: 30,
            directory_fetch_timeout_secs: 3600,
        }
    }
}

impl CacheConfig {
    /// Default config file location (`<config dir>/davcache/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("davcache").join("config.json"))
    }

    /// Load a config file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Self = serde_json::from_slice(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Apply `DAVCACHE_*` environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("DAVCACHE_WEBDAV_URL") {
            self.webdav_base_url = url;
        }
        if let Some(user) = lookup("DAVCACHE_USERNAME") {
            self.username = Some(user);
        }
        if let Some(password) = lookup("DAVCACHE_PASSWORD") {
            self.password = Some(password);
        }
        if let Some(dir) = lookup("DAVCACHE_CACHE_DIR") {
            self.cache_parent_directory = Some(PathBuf::from(dir));
        }
        if let Some(gb) = lookup("DAVCACHE_CAPACITY_GB") {
            match gb.trim().parse() {
                Ok(gb) => self.capacity_gigabytes = gb,
                Err(_) => warn!(value = %gb, "Ignoring invalid DAVCACHE_CAPACITY_GB"),
            }
        }
        if let Some(disabled) = lookup("DAVCACHE_DISABLED") {
            self.cache_disabled = matches!(disabled.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    /// Capacity in gigabytes after clamping
    pub fn effective_capacity_gigabytes(&self) -> u64 {
        clamp_capacity_gigabytes(self.capacity_gigabytes)
    }

    /// Clamped capacity in kilobytes
    pub fn kilobyte_capacity(&self) -> u64 {
        gigabytes_to_kilobytes(self.effective_capacity_gigabytes())
    }

    /// Directory that holds the hidden cache root
    pub fn cache_parent(&self) -> PathBuf {
        self.cache_parent_directory
            .clone()
            .or_else(dirs::cache_dir)
            .unwrap_or_else(|| PathBuf::from("/tmp"))
    }

    /// WebDAV client settings
    pub fn client_options(&self) -> ClientOptions {
        let credentials = match (&self.username, &self.password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            (Some(user), None) => Some((user.clone(), String::new())),
            _ => None,
        };
        ClientOptions {
            credentials,
            max_connections_per_host: self.max_connections_per_host,
            max_total_connections: self.max_total_connections,
            transfer_timeout: Duration::from_secs(self.transfer_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }

    /// Cache tunables derived from this config
    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            directory_fetch_timeout: Duration::from_secs(self.directory_fetch_timeout_secs),
            ..CacheSettings::default()
        }
    }
}

/// Clamp a capacity to the supported range
pub fn clamp_capacity_gigabytes(gigabytes: u64) -> u64 {
    gigabytes.clamp(MIN_CAPACITY_GIGABYTES, MAX_CAPACITY_GIGABYTES)
}

pub fn gigabytes_to_kilobytes(gigabytes: u64) -> u64 {
    gigabytes * KILOBYTES_PER_GIGABYTE
}

pub fn kilobytes_to_gigabytes(kilobytes: u64) -> f64 {
    kilobytes as f64 / KILOBYTES_PER_GIGABYTE as f64
}
