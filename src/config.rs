//! Configuration management for castplayer
//!
//! Config is stored at ~/.config/castplayer/config.toml. Every field is
//! optional in the file. Environment variables take precedence:
//! - `CASTPLAYER_DEVICE`: cast device name or IP
//! - `CASTPLAYER_CATALOG_URL`: catalog document URL

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::catalog::{DEFAULT_CATALOG_URL, DEFAULT_MEDIA_ROOT};
use crate::controller::{ControllerConfig, StateConfig};
use crate::stream::PlayerType;

pub const ENV_DEVICE: &str = "CASTPLAYER_DEVICE";
pub const ENV_CATALOG_URL: &str = "CASTPLAYER_CATALOG_URL";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Catalog document URL
    pub catalog_url: String,
    /// Root for relative thumbnail paths
    pub media_root: String,
    /// Default Chromecast device name
    pub default_device: Option<String>,
    /// Local player (vlc or mpv)
    pub player: PlayerType,
    /// Path to the catt binary
    pub catt_path: String,
    /// Progress timer interval
    pub tick_interval_ms: u64,
    /// Interval between remote status polls
    pub status_poll_interval_ms: u64,
    /// First retry delay while the remote service is unavailable
    pub init_backoff_ms: u64,
    pub init_backoff_max_ms: u64,
    /// Start remote media as soon as it is loaded
    pub autoplay: bool,
    /// Volume at startup (0.0 - 1.0)
    pub initial_volume: f32,
    /// Log filter used when RUST_LOG is not set
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            media_root: DEFAULT_MEDIA_ROOT.to_string(),
            default_device: None,
            player: PlayerType::default(),
            catt_path: "catt".to_string(),
            tick_interval_ms: 1000,
            status_poll_interval_ms: 1000,
            init_backoff_ms: 1000,
            init_backoff_max_ms: 30_000,
            autoplay: true,
            initial_volume: 1.0,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Get config file path (~/.config/castplayer/config.toml)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("castplayer").join("config.toml"))
    }

    /// Load config from `path`, or from the default path when `None`.
    /// A missing file yields defaults; an invalid one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path.map(Path::to_path_buf).or_else(Self::path) {
            Some(path) => path,
            None => return Ok(Self::default()),
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load config from `path`, failing on I/O or parse errors
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse config")
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::path().ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Apply `CASTPLAYER_*` environment overrides
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (environment in production)
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(device) = lookup(ENV_DEVICE).filter(|d| !d.is_empty()) {
            self.default_device = Some(device);
        }
        if let Some(url) = lookup(ENV_CATALOG_URL).filter(|u| !u.is_empty()) {
            self.catalog_url = url;
        }
        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms.max(1))
    }

    /// Controller tunables derived from this config
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            state: StateConfig {
                tick_interval: self.tick_interval(),
                autoplay: self.autoplay,
                initial_volume: self.initial_volume,
            },
            init_backoff: Duration::from_millis(self.init_backoff_ms.max(1)),
            init_backoff_max: Duration::from_millis(
                self.init_backoff_max_ms.max(self.init_backoff_ms),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.default_device.is_none());
        assert_eq!(config.catalog_url, DEFAULT_CATALOG_URL);
        assert_eq!(config.player, PlayerType::Vlc);
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert!(config.autoplay);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            default_device = "Living Room"
            player = "mpv"
            tick_interval_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.default_device.as_deref(), Some("Living Room"));
        assert_eq!(config.player, PlayerType::Mpv);
        assert_eq!(config.tick_interval(), Duration::from_millis(500));
        assert_eq!(config.catt_path, "catt");
    }

    #[test]
    fn test_invalid_toml() {
        assert!(Config::from_toml("player = 3").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default().with_overrides(|key| match key {
            ENV_DEVICE => Some("Kitchen".to_string()),
            ENV_CATALOG_URL => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.default_device.as_deref(), Some("Kitchen"));
        // Empty values do not override
        assert_eq!(config.catalog_url, DEFAULT_CATALOG_URL);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("castplayer-test-{}", uuid::Uuid::new_v4()))
            .join("config.toml");
        let config = Config {
            default_device: Some("Bedroom".to_string()),
            initial_volume: 0.5,
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load(Some(&path)).unwrap(), config);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_missing_file_is_default() {
        let path = std::env::temp_dir().join("castplayer-does-not-exist.toml");
        assert_eq!(Config::load(Some(&path)).unwrap(), Config::default());
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = std::env::temp_dir().join(format!("castplayer-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "player = 5").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_controller_config() {
        let config = Config {
            init_backoff_ms: 2000,
            init_backoff_max_ms: 100,
            autoplay: false,
            ..Config::default()
        };
        let controller = config.controller_config();
        assert_eq!(controller.init_backoff, Duration::from_secs(2));
        assert_eq!(controller.init_backoff_max, Duration::from_secs(2));
        assert!(!controller.state.autoplay);
    }
}
