//! Cache configuration management.
//!
//! Loads and saves the small JSON config holding the cache root
//! override and worker tuning. A missing or unreadable config silently
//! falls back to defaults; the cache root defaults to the
//! platform-specific cache directory.

use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Cache subsystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Explicit cache root; `None` means the platform cache directory.
    #[serde(default)]
    pub cache_root: Option<PathBuf>,
    /// Prefetch worker threads; 0 lets rayon pick. Feeds
    /// [`crate::prefetch::PrefetchConfig`] via its `From<&Config>` impl.
    #[serde(default)]
    pub workers: usize,
    /// Bound, in seconds, on network-facing collaborator calls. Feeds
    /// [`crate::prefetch::PrefetchConfig`] via its `From<&Config>` impl.
    #[serde(default = "default_timeout_secs")]
    pub network_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_root: None,
            workers: 0,
            network_timeout_secs: default_timeout_secs(),
        }
    }
}

impl Config {
    /// Load the configuration from the default platform-specific path.
    #[must_use]
    pub fn load() -> Self {
        match Self::load_internal() {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Failed to load config, using defaults: {}", e);
                Self::default()
            }
        }
    }

    fn load_internal() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save the configuration to the default platform-specific path.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// The cache root to use: the explicit override, or the platform
    /// cache directory.
    pub fn effective_cache_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.cache_root {
            return Ok(root.clone());
        }
        let project_dirs = ProjectDirs::from("com", "redmedia", "redcache")
            .ok_or_else(|| anyhow::anyhow!("Failed to determine project directories"))?;
        Ok(project_dirs.cache_dir().to_path_buf())
    }

    /// Get the default platform-specific configuration path.
    fn config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "redmedia", "redcache")
            .ok_or_else(|| anyhow::anyhow!("Failed to determine project directories"))?;
        Ok(project_dirs.config_dir().join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert!(config.cache_root.is_none());
        assert_eq!(config.workers, 0);
        assert_eq!(config.network_timeout_secs, 30);
    }

    #[test]
    fn explicit_root_wins() {
        let config = Config {
            cache_root: Some(PathBuf::from("/custom/cache")),
            ..Config::default()
        };
        assert_eq!(
            config.effective_cache_root().unwrap(),
            PathBuf::from("/custom/cache")
        );
    }

    #[test]
    fn partial_config_json_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"workers": 4}"#).unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.network_timeout_secs, 30);
        assert!(config.cache_root.is_none());
    }
}
