//! Configuration management (TOML)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub general: GeneralConfig,
    pub storage: StorageConfig,
    pub query: QueryConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one `performance_<tenant>.db` per tenant.
    pub data_dir: PathBuf,
    /// Upper bound on query connections open at once.
    pub max_connections: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    pub timeout_seconds: u64,
    /// Used when a request leaves out the number of processes. Zero or less means all.
    pub default_top_k: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            general: GeneralConfig { log_level: "info".to_string() },
            storage: StorageConfig {
                data_dir: Self::default_data_dir(),
                max_connections: 8,
            },
            query: QueryConfig {
                timeout_seconds: 30,
                default_top_k: 10,
            },
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config {:?}", path))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content).with_context(|| format!("failed to write config {:?}", path))?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "vigilante")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    pub fn default_data_dir() -> PathBuf {
        directories::ProjectDirs::from("", "", "vigilante")
            .map(|dirs| dirs.data_dir().join("tenants"))
            .unwrap_or_else(|| PathBuf::from("tenants"))
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query.timeout_seconds.max(1))
    }
}
