use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::lock::FileLock;
use crate::paths::{get_config_path, get_default_store_path};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// LMDB environment directory. Defaults to the data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default = "default_map_size")]
    pub map_size: u64,
    /// Serialize writers across processes with a lock file next to the store.
    #[serde(default = "default_lock")]
    pub lock: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            map_size: default_map_size(),
            lock: default_lock(),
        }
    }
}

fn default_map_size() -> u64 {
    16 * 1024 * 1024 // 16MB
}

fn default_lock() -> bool {
    true
}

impl StoreConfig {
    pub fn resolved_path(&self) -> PathBuf {
        match &self.path {
            Some(path) => PathBuf::from(path),
            None => get_default_store_path(),
        }
    }

    pub fn lock_path(&self) -> Option<PathBuf> {
        if self.lock {
            Some(self.resolved_path().with_extension("lock"))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&get_config_path())
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&get_config_path())
    }

    pub fn load_from(config_path: &Path) -> Result<Self, ConfigError> {
        let _lock = FileLock::acquire_exclusive(&config_path.with_extension("lock"))?;
        Self::load_unlocked(config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<(), ConfigError> {
        let _lock = FileLock::acquire_exclusive(&config_path.with_extension("lock"))?;
        self.save_unlocked(config_path)
    }

    fn load_unlocked(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(config_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    fn save_unlocked(&self, config_path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.store.map_size, 16 * 1024 * 1024);
        assert!(config.store.lock);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[store]\npath = \"/tmp/pd.lmdb\"\nlock = false\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.store.resolved_path(), PathBuf::from("/tmp/pd.lmdb"));
        assert_eq!(config.store.lock_path(), None);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.logging.level = "debug".to_string();
        config.store.path = Some("/var/lib/promptdesk/store.lmdb".to_string());
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(
            loaded.store.lock_path(),
            Some(PathBuf::from("/var/lib/promptdesk/store.lock"))
        );
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[store\nmap_size = ").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::TomlParse(_))
        ));
    }
}
