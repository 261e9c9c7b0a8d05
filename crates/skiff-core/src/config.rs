//! Configuration system for skiff.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $SKIFF_CONFIG (explicit override)
//!   2. ./skiff.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SkiffConfig {
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub janitor: JanitorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Listen address for the HTTP/WebSocket server.
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding backing files and upload manifests.
    pub temp_dir: PathBuf,
    /// Fixed chunk size for resumable uploads, in bytes.
    pub chunk_size: u64,
    /// Upper bound on a single file (and on a WS message), in bytes.
    pub max_file_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JanitorConfig {
    /// Seconds between orphaned-file sweeps.
    pub orphan_sweep_secs: u64,
    /// Seconds between aged-file sweeps.
    pub age_sweep_secs: u64,
    /// Files with an mtime older than this many seconds are reclaimed.
    pub max_age_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for SkiffConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            storage: StorageConfig::default(),
            janitor: JanitorConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9555,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("./temp"),
            chunk_size: 5 * 1024 * 1024,
            max_file_size: 100 * 1024 * 1024 * 1024,
        }
    }
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            orphan_sweep_secs: 5 * 60,
            age_sweep_secs: 24 * 60 * 60,
            max_age_secs: 24 * 60 * 60,
        }
    }
}

impl NetworkConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl JanitorConfig {
    pub fn orphan_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.orphan_sweep_secs)
    }

    pub fn age_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.age_sweep_secs)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl SkiffConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            SkiffConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("SKIFF_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./skiff.toml"))
    }

    /// Apply SKIFF_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SKIFF_NETWORK__HOST") {
            self.network.host = v;
        }
        if let Ok(v) = std::env::var("SKIFF_NETWORK__PORT") {
            if let Ok(p) = v.parse() {
                self.network.port = p;
            }
        }
        if let Ok(v) = std::env::var("SKIFF_STORAGE__TEMP_DIR") {
            self.storage.temp_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SKIFF_STORAGE__MAX_FILE_SIZE") {
            if let Ok(n) = v.parse() {
                self.storage.max_file_size = n;
            }
        }
        if let Ok(v) = std::env::var("SKIFF_JANITOR__ORPHAN_SWEEP_SECS") {
            if let Ok(n) = v.parse() {
                self.janitor.orphan_sweep_secs = n;
            }
        }
        if let Ok(v) = std::env::var("SKIFF_JANITOR__MAX_AGE_SECS") {
            if let Ok(n) = v.parse() {
                self.janitor.max_age_secs = n;
            }
        }
    }
}
