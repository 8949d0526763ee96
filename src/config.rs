use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine the config directory")]
    ConfigDirError,
    #[error("no configuration file found at {0}; create one with a `path` entry")]
    Missing(String),
    #[error("failed to read config file: {0}")]
    ReadError(String),
    #[error("failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("invalid `default_priority`: must be 0-9")]
    InvalidPriority,
    #[error("`path` must name at least one list directory")]
    NoPaths,
    #[error("failed to read list directory {0}: {1}")]
    ListDirError(String, String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// List directories. An entry ending in `/*` selects every
    /// subdirectory of its parent (vdir layouts keep one directory per
    /// calendar under a common root).
    pub path: Vec<String>,
    #[serde(default = "default_cache_path")]
    pub cache_path: String,
    /// Hours added to "now" for the due date of new todos; 0 disables.
    #[serde(default = "default_due")]
    pub default_due: i64,
    #[serde(default)]
    pub default_priority: Option<u8>,
    /// List used by `new` when none is given.
    #[serde(default)]
    pub default_list: Option<String>,
}

fn default_due() -> i64 {
    24
}

fn default_cache_path() -> String {
    if let Some(cache_dir) = utils::get_cache_dir() {
        cache_dir.join("cache.sqlite3").to_string_lossy().to_string()
    } else {
        "~/.cache/tdo/cache.sqlite3".to_string()
    }
}

impl Config {
    /// Load the configuration, from an explicit path or the platform
    /// config directory.
    pub fn load(path_override: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path_override {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };
        if !config_path.exists() {
            return Err(ConfigError::Missing(
                config_path.to_string_lossy().to_string(),
            ));
        }

        let contents = fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = utils::get_config_dir().ok_or(ConfigError::ConfigDirError)?;
        Ok(config_dir.join("config.toml"))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.path.is_empty() {
            return Err(ConfigError::NoPaths);
        }
        if matches!(self.default_priority, Some(p) if p > 9) {
            return Err(ConfigError::InvalidPriority);
        }
        Ok(())
    }

    /// Expand the configured entries into concrete list directories.
    pub fn discover_lists(&self) -> Result<Vec<PathBuf>, ConfigError> {
        let mut lists = Vec::new();
        for entry in &self.path {
            if let Some(parent) = entry.strip_suffix("/*") {
                let parent = utils::expand_path(parent);
                let children = fs::read_dir(&parent).map_err(|e| {
                    ConfigError::ListDirError(parent.to_string_lossy().to_string(), e.to_string())
                })?;
                let mut subdirs: Vec<PathBuf> = children
                    .filter_map(|child| child.ok())
                    .map(|child| child.path())
                    .filter(|path| path.is_dir())
                    .collect();
                subdirs.sort();
                lists.extend(subdirs);
            } else {
                lists.push(utils::expand_path(entry));
            }
        }
        Ok(lists)
    }

    /// Get the expanded cache snapshot path (with ~ expansion)
    pub fn get_cache_path(&self) -> PathBuf {
        utils::expand_path(&self.cache_path)
    }

    /// The run-scoped id file lives next to the cache snapshot.
    pub fn id_file_path(&self) -> PathBuf {
        let cache_path = self.get_cache_path();
        match cache_path.parent() {
            Some(parent) => parent.join("ids"),
            None => PathBuf::from("ids"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn minimal_config_gets_defaults() {
        let config: Config = toml::from_str("path = [\"~/todos/work\"]").unwrap();
        config.validate().unwrap();
        assert_eq!(config.default_due, 24);
        assert_eq!(config.default_priority, None);
        assert!(!config.cache_path.is_empty());
    }

    #[test]
    fn out_of_range_default_priority_is_rejected() {
        let config: Config =
            toml::from_str("path = [\"~/todos\"]\ndefault_priority = 12").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPriority)
        ));
    }

    #[test]
    fn empty_path_list_is_rejected() {
        let config: Config = toml::from_str("path = []").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::NoPaths)));
    }

    #[test]
    fn wildcard_entries_expand_to_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("work")).unwrap();
        fs::create_dir(dir.path().join("home")).unwrap();
        fs::write(dir.path().join("stray.txt"), "").unwrap();

        let config = Config {
            path: vec![format!("{}/*", dir.path().display())],
            cache_path: String::new(),
            default_due: 24,
            default_priority: None,
            default_list: None,
        };
        let lists = config.discover_lists().unwrap();
        assert_eq!(lists.len(), 2);
        assert!(lists.iter().all(|p| p.is_dir()));
    }
}
