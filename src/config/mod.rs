//! Configuration system
//!
//! Handles loading configuration from multiple sources:
//! - Global config (~/.config/perfdash/config.toml)
//! - Project config (./perfdash.toml or .perfdash/config.toml)
//! - Environment variables (PERFDASH_*)

use crate::engine::{EngineOptions, PropagationEngine, WriteMode};
use crate::store::{FileStore, MemoryStore, Store};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Where collections are kept
    #[serde(default)]
    pub store: StoreConfig,

    /// Propagation engine behavior
    #[serde(default)]
    pub propagation: PropagationConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StoreConfig {
    /// Storage backend, `file` unless set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<StoreBackend>,

    /// Directory for the file backend. Defaults to the platform data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Byte quota for the memory backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota_bytes: Option<usize>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    File,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            _ => anyhow::bail!("Unknown store backend: {} (expected file or memory)", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PropagationConfig {
    /// `patch` (default) or `replace`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_mode: Option<WriteMode>,

    /// Weight for KPI-linked objectives without a declared contribution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_kpi_contribution: Option<f64>,
}

impl PropagationConfig {
    pub fn engine_options(&self) -> EngineOptions {
        let defaults = EngineOptions::default();
        EngineOptions {
            write_mode: self.write_mode.unwrap_or(defaults.write_mode),
            default_kpi_contribution: self
                .default_kpi_contribution
                .unwrap_or(defaults.default_kpi_contribution),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl LoggingConfig {
    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or("info")
    }
}

fn parse_write_mode(value: &str) -> Result<WriteMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "patch" => Ok(WriteMode::Patch),
        "replace" => Ok(WriteMode::Replace),
        _ => anyhow::bail!("Invalid write mode: {} (expected patch or replace)", value),
    }
}

impl Config {
    /// Load configuration from all sources (global, project, env)
    pub async fn load() -> Result<Self> {
        let mut paths = Vec::new();
        if let Some(global_path) = Self::global_config_path() {
            paths.push(global_path);
        }
        paths.push(PathBuf::from("perfdash.toml"));
        paths.push(PathBuf::from(".perfdash/config.toml"));

        let mut config = Self::load_from_paths(&paths).await?;
        config.apply_env();
        Ok(config)
    }

    /// Merge the given files in order; missing files are skipped
    pub async fn load_from_paths(paths: &[PathBuf]) -> Result<Self> {
        let mut config = Self::default();
        for path in paths {
            if let Some(layer) = Self::read_file(path).await? {
                config = config.merge(layer);
            }
        }
        Ok(config)
    }

    async fn read_file(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Config layer loaded");
        Ok(Some(config))
    }

    /// Get the global config directory path
    pub fn global_config_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "perfdash", "perfdash")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path
    pub fn data_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "perfdash", "perfdash").map(|dirs| dirs.data_dir().to_path_buf())
    }

    /// Initialize default configuration file
    pub async fn init_default() -> Result<()> {
        if let Some(path) = Self::global_config_path() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            let default = Self {
                store: StoreConfig {
                    backend: Some(StoreBackend::File),
                    path: Self::data_dir().map(|d| d.join("store")),
                    quota_bytes: None,
                },
                propagation: PropagationConfig {
                    write_mode: Some(WriteMode::Patch),
                    default_kpi_contribution: Some(100.0),
                },
                logging: LoggingConfig {
                    level: Some("info".to_string()),
                },
            };
            let content = toml::to_string_pretty(&default)?;
            fs::write(&path, content).await?;
            tracing::info!("Created config at {:?}", path);
        }
        Ok(())
    }

    /// Set a configuration value in the global config file
    pub async fn set(key: &str, value: &str) -> Result<()> {
        let path = Self::global_config_path()
            .context("No config directory available on this platform")?;
        let mut config = Self::read_file(&path).await?.unwrap_or_default();
        config.apply_key(key, value)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = toml::to_string_pretty(&config)?;
        fs::write(&path, content).await?;
        Ok(())
    }

    /// Apply one dotted `key = value` assignment
    pub fn apply_key(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "store.backend" => self.store.backend = Some(value.parse()?),
            "store.path" => self.store.path = Some(PathBuf::from(value)),
            "store.quota_bytes" => {
                self.store.quota_bytes = Some(
                    value
                        .trim()
                        .parse()
                        .with_context(|| format!("Invalid quota: {}", value))?,
                )
            }
            "propagation.write_mode" => {
                self.propagation.write_mode = Some(parse_write_mode(value)?)
            }
            "propagation.default_kpi_contribution" => {
                let weight: f64 = value
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid contribution: {}", value))?;
                if !(0.0..=100.0).contains(&weight) {
                    anyhow::bail!("Contribution must be between 0 and 100, got {}", weight);
                }
                self.propagation.default_kpi_contribution = Some(weight);
            }
            "logging.level" => self.logging.level = Some(value.to_string()),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        Ok(())
    }

    /// Merge two configs (other takes precedence)
    fn merge(mut self, other: Self) -> Self {
        if other.store.backend.is_some() {
            self.store.backend = other.store.backend;
        }
        if other.store.path.is_some() {
            self.store.path = other.store.path;
        }
        if other.store.quota_bytes.is_some() {
            self.store.quota_bytes = other.store.quota_bytes;
        }
        if other.propagation.write_mode.is_some() {
            self.propagation.write_mode = other.propagation.write_mode;
        }
        if other.propagation.default_kpi_contribution.is_some() {
            self.propagation.default_kpi_contribution = other.propagation.default_kpi_contribution;
        }
        if other.logging.level.is_some() {
            self.logging.level = other.logging.level;
        }
        self
    }

    /// Apply environment variable overrides
    fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        const OVERRIDES: [(&str, &str); 5] = [
            ("PERFDASH_STORE_BACKEND", "store.backend"),
            ("PERFDASH_STORE_PATH", "store.path"),
            ("PERFDASH_WRITE_MODE", "propagation.write_mode"),
            ("PERFDASH_DEFAULT_KPI_CONTRIBUTION", "propagation.default_kpi_contribution"),
            ("PERFDASH_LOG_LEVEL", "logging.level"),
        ];
        for (var, key) in OVERRIDES {
            if let Some(val) = lookup(var)
                && let Err(e) = self.apply_key(key, &val)
            {
                tracing::warn!(variable = var, value = %val, error = %e, "Ignoring invalid environment override");
            }
        }
    }

    /// Directory used by the file backend
    pub fn store_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .or_else(|| Self::data_dir().map(|d| d.join("store")))
            .unwrap_or_else(|| std::env::temp_dir().join("perfdash").join("store"))
    }

    /// Open the configured store backend
    pub fn open_store(&self) -> Result<Arc<dyn Store>> {
        match self.store.backend.unwrap_or_default() {
            StoreBackend::File => {
                let path = self.store_path();
                let store = FileStore::open(&path)
                    .with_context(|| format!("Failed to open store at {}", path.display()))?;
                Ok(Arc::new(store))
            }
            StoreBackend::Memory => {
                tracing::warn!("Memory store selected; nothing will outlive this process");
                Ok(Arc::new(match self.store.quota_bytes {
                    Some(quota) => MemoryStore::with_quota(quota),
                    None => MemoryStore::new(),
                }))
            }
        }
    }

    /// Build a propagation engine over the configured store
    pub fn engine(&self) -> Result<PropagationEngine> {
        Ok(PropagationEngine::with_options(
            self.open_store()?,
            self.propagation.engine_options(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_layers_merge_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("global.toml");
        let project = dir.path().join("project.toml");
        std::fs::write(
            &global,
            "[store]\nbackend = \"memory\"\nquota_bytes = 1024\n\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();
        std::fs::write(&project, "[propagation]\nwrite_mode = \"replace\"\n\n[logging]\nlevel = \"warn\"\n")
            .unwrap();

        let config = Config::load_from_paths(&[global, dir.path().join("missing.toml"), project])
            .await
            .unwrap();
        assert_eq!(config.store.backend, Some(StoreBackend::Memory));
        assert_eq!(config.store.quota_bytes, Some(1024));
        assert_eq!(config.propagation.write_mode, Some(WriteMode::Replace));
        assert_eq!(config.logging.level(), "warn");
    }

    #[tokio::test]
    async fn test_invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[store\n").unwrap();
        assert!(Config::load_from_paths(&[path]).await.is_err());
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.logging.level(), "info");
        let options = config.propagation.engine_options();
        assert_eq!(options.write_mode, WriteMode::Patch);
        assert_eq!(options.default_kpi_contribution, 100.0);
    }

    #[test]
    fn test_apply_key() {
        let mut config = Config::default();
        config.apply_key("store.path", "/tmp/pd").unwrap();
        config.apply_key("propagation.write_mode", "REPLACE").unwrap();
        config
            .apply_key("propagation.default_kpi_contribution", "25")
            .unwrap();
        assert_eq!(config.store_path(), PathBuf::from("/tmp/pd"));
        assert_eq!(config.propagation.write_mode, Some(WriteMode::Replace));
        assert_eq!(config.propagation.default_kpi_contribution, Some(25.0));

        assert!(config.apply_key("propagation.default_kpi_contribution", "120").is_err());
        assert!(config.apply_key("store.backend", "redis").is_err());
        assert!(config.apply_key("nope", "1").is_err());
    }

    #[test]
    fn test_env_overrides_skip_invalid_values() {
        let env: HashMap<&str, &str> = [
            ("PERFDASH_STORE_BACKEND", "memory"),
            ("PERFDASH_WRITE_MODE", "sideways"),
            ("PERFDASH_LOG_LEVEL", "trace"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_from(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.store.backend, Some(StoreBackend::Memory));
        assert_eq!(config.propagation.write_mode, None);
        assert_eq!(config.logging.level(), "trace");
    }

    #[test]
    fn test_memory_backend_engine() {
        let mut config = Config::default();
        config.apply_key("store.backend", "memory").unwrap();
        let engine = config.engine().unwrap();
        assert!(engine.repositories().store().keys().unwrap().is_empty());
    }
}
