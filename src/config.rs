//! Runtime configuration
//!
//! Stored as TOML under the user's config directory. A missing file is not an error: the
//! defaults are used and written out so they can be edited. A file that exists but does not
//! parse is reported instead of silently replaced.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::hub::{CadenceIntervals, HubSettings, InputSettings};
use crate::loader::LoadPolicy;

const CONFIG_DIR: &str = "trackhub";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No config directory available on this platform")]
    NoConfigDir,

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct CadenceConfig {
    pub render_interval_ms: u64,
    pub input_interval_ms: u64,
    pub update_interval_ms: u64,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            render_interval_ms: 11, // ~90 Hz display
            input_interval_ms: 4,   // ~250 Hz sampling
            update_interval_ms: 33, // ~30 Hz bookkeeping
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LoaderConfig {
    pub poll_interval_ms: u64,
    /// `None` keeps polling a stuck load forever
    pub timeout_ms: Option<u64>,
    pub max_polls: Option<u32>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            timeout_ms: Some(30_000),
            max_polls: None,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DemoConfig {
    pub run_seconds: u64,
    pub slot_count: usize,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            run_seconds: 10,
            slot_count: 8,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub cadence: CadenceConfig,
    pub loader: LoaderConfig,
    pub input: InputSettings,
    pub logging: LoggingConfig,
    pub demo: DemoConfig,
}

impl RuntimeConfig {
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        Ok(path)
    }

    /// Loads from the default location, writing defaults there if nothing exists yet.
    pub async fn load_or_init() -> Result<Self, ConfigError> {
        let path = Self::default_path()?;
        Self::load_or_init_at(&path).await
    }

    pub async fn load_or_init_at(path: &Path) -> Result<Self, ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        if !exists {
            info!("No config at {}, writing defaults", path.display());
            let config = Self::default();
            config.save_at(path).await?;
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub async fn save_at(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ConfigError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content)
            .await
            .map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let cadence = &self.cadence;
        if cadence.render_interval_ms == 0
            || cadence.input_interval_ms == 0
            || cadence.update_interval_ms == 0
        {
            return Err(ConfigError::Invalid(
                "cadence intervals must be greater than zero".to_string(),
            ));
        }
        if self.loader.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "loader.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.input.joystick_deadzone) {
            return Err(ConfigError::Invalid(format!(
                "input.joystick_deadzone {} outside [0, 1)",
                self.input.joystick_deadzone
            )));
        }
        if self.loader.timeout_ms.is_none() && self.loader.max_polls.is_none() {
            warn!("Loader has neither timeout nor poll limit; a stuck load never finishes");
        }
        Ok(())
    }

    pub fn cadence_intervals(&self) -> CadenceIntervals {
        CadenceIntervals {
            render: Duration::from_millis(self.cadence.render_interval_ms),
            input: Duration::from_millis(self.cadence.input_interval_ms),
            update: Duration::from_millis(self.cadence.update_interval_ms),
        }
    }

    pub fn load_policy(&self) -> LoadPolicy {
        LoadPolicy {
            poll_interval: Duration::from_millis(self.loader.poll_interval_ms),
            timeout: self.loader.timeout_ms.map(Duration::from_millis),
            max_polls: self.loader.max_polls,
        }
    }

    pub fn hub_settings(&self) -> HubSettings {
        HubSettings {
            input: self.input.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let config = RuntimeConfig::load_or_init_at(&path).await.unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert!(path.exists());

        let reloaded = RuntimeConfig::load_or_init_at(&path).await.unwrap();
        assert_eq!(reloaded, config);
    }

    #[tokio::test]
    async fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        tokio::fs::write(&path, "[loader]\npoll_interval_ms = 20\nmax_polls = 100\n")
            .await
            .unwrap();

        let config = RuntimeConfig::load_or_init_at(&path).await.unwrap();
        assert_eq!(config.loader.poll_interval_ms, 20);
        assert_eq!(config.loader.max_polls, Some(100));
        assert_eq!(config.loader.timeout_ms, Some(30_000));
        assert_eq!(config.cadence, CadenceConfig::default());

        let policy = config.load_policy();
        assert_eq!(policy.poll_interval, Duration::from_millis(20));
    }

    #[tokio::test]
    async fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        tokio::fs::write(&path, "cadence = 12").await.unwrap();

        let err = RuntimeConfig::load_or_init_at(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let mut config = RuntimeConfig::default();
        config.cadence.input_interval_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
