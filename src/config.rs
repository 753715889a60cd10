// Global configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::pipeline::{BackpressureMode, DEFAULT_QUEUE_CAPACITY};
use crate::preview::DEFAULT_SLOT_COUNT;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path to the ffmpeg executable; `None` resolves through PATH.
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Encode queue depth for new sessions.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Full-queue policy for new sessions.
    #[serde(default)]
    pub backpressure: BackpressureMode,

    /// Ring depth for new preview channels.
    #[serde(default = "default_preview_slots")]
    pub preview_slots: u32,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_preview_slots() -> u32 {
    DEFAULT_SLOT_COUNT
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            queue_capacity: default_queue_capacity(),
            backpressure: BackpressureMode::default(),
            preview_slots: default_preview_slots(),
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "macos") {
            dirs::home_dir()
                .context("Could not determine home directory")?
                .join(".config")
                .join("framesink")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("framesink")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from disk, falling back to built-in defaults when no
    /// file exists.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let contents = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;

            let config: Config = toml::from_str(&contents).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?;

            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.defaults.ffmpeg_path, None);
        assert_eq!(config.defaults.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.defaults.backpressure, BackpressureMode::Block);
        assert_eq!(config.defaults.preview_slots, DEFAULT_SLOT_COUNT);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();

        // Should be able to deserialize back
        let deserialized: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(
            deserialized.defaults.queue_capacity,
            config.defaults.queue_capacity
        );
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: Config = toml::from_str("[defaults]\nqueue_capacity = 4\n").unwrap();
        assert_eq!(config.defaults.queue_capacity, 4);
        assert_eq!(config.defaults.preview_slots, DEFAULT_SLOT_COUNT);
        assert_eq!(config.defaults.backpressure, BackpressureMode::Block);
    }
}
