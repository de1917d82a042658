// Configuration loaded from YAML

use crate::storage::{
    DEFAULT_QUOTA_BYTES, FileStorage, KeyValueStorage, MemoryStorage, SqliteStorage,
};
use crate::store::DEFAULT_STORAGE_KEY;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const APP_DIR: &str = "todostore";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    File,
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: Backend,
    /// Directory (file backend) or database file (sqlite backend)
    pub path: Option<PathBuf>,
    pub key: String,
    /// `None` disables the quota check
    pub quota_bytes: Option<u64>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            path: None,
            key: DEFAULT_STORAGE_KEY.to_string(),
            quota_bytes: Some(DEFAULT_QUOTA_BYTES),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            log_level: "warn".to_string(),
        }
    }
}

impl Config {
    /// `<config dir>/todostore/config.yml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.yml"))
    }

    /// Load from an explicit path, or from the default location if it exists.
    ///
    /// A missing default file yields the defaults; a missing explicit file is
    /// an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => {
                    debug!("No config file found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config =
            serde_yaml::from_str(&content).with_context(|| format!("Failed to parse config file {}", path.display()))?;

        info!(path = ?path, backend = ?config.storage.backend, "Loaded config");
        Ok(config)
    }

    /// Where the configured backend keeps its data
    pub fn data_path(&self) -> PathBuf {
        if let Some(path) = &self.storage.path {
            return path.clone();
        }

        let base = dirs::data_dir()
            .map(|dir| dir.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from(".todostore"));
        match self.storage.backend {
            Backend::Sqlite => base.join("todostore.db"),
            Backend::File | Backend::Memory => base,
        }
    }

    /// Open the configured storage backend
    pub fn open_storage(&self) -> Result<Box<dyn KeyValueStorage>> {
        let quota = self.storage.quota_bytes;
        let storage: Box<dyn KeyValueStorage> = match self.storage.backend {
            Backend::Memory => Box::new(match quota {
                Some(q) => MemoryStorage::with_quota(q),
                None => MemoryStorage::new(),
            }),
            Backend::File => {
                let path = self.data_path();
                let storage = FileStorage::open(&path)
                    .with_context(|| format!("Failed to open file storage at {}", path.display()))?;
                Box::new(match quota {
                    Some(q) => storage.with_quota(q),
                    None => storage,
                })
            }
            Backend::Sqlite => {
                let path = self.data_path();
                let storage = SqliteStorage::open(&path)
                    .with_context(|| format!("Failed to open SQLite storage at {}", path.display()))?;
                Box::new(match quota {
                    Some(q) => storage.with_quota(q),
                    None => storage,
                })
            }
        };

        debug!(backend = ?self.storage.backend, "Opened storage");
        Ok(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage.backend, Backend::File);
        assert_eq!(config.storage.key, "todoAppData");
        assert_eq!(config.storage.quota_bytes, Some(DEFAULT_QUOTA_BYTES));
    }

    #[test]
    fn test_from_file_partial_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yml");
        fs::write(
            &path,
            "storage:\n  backend: sqlite\n  path: /tmp/todo.db\nlog_level: debug\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.storage.backend, Backend::Sqlite);
        assert_eq!(config.storage.path, Some(PathBuf::from("/tmp/todo.db")));
        assert_eq!(config.storage.key, DEFAULT_STORAGE_KEY);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let temp = TempDir::new().unwrap();
        assert!(Config::load(Some(&temp.path().join("nope.yml"))).is_err());
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yml");
        fs::write(&path, "storage: [not, a, map]\n").unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn test_open_file_storage() {
        let temp = TempDir::new().unwrap();
        let config = Config {
            storage: StorageConfig {
                backend: Backend::File,
                path: Some(temp.path().join("data")),
                ..Default::default()
            },
            ..Default::default()
        };

        let mut storage = config.open_storage().unwrap();
        storage.set_item("todoAppData", "{}").unwrap();
        assert!(temp.path().join("data/todoAppData.json").exists());
    }

    #[test]
    fn test_open_sqlite_storage() {
        let temp = TempDir::new().unwrap();
        let config = Config {
            storage: StorageConfig {
                backend: Backend::Sqlite,
                path: Some(temp.path().join("todo.db")),
                quota_bytes: None,
                ..Default::default()
            },
            ..Default::default()
        };

        let mut storage = config.open_storage().unwrap();
        storage.set_item("todoAppData", "{}").unwrap();
        assert_eq!(storage.get_item("todoAppData").unwrap().as_deref(), Some("{}"));
    }
}
