//! Application settings stored in `settings.toml`
//!
//! The role flag itself is not part of these settings. It lives in
//! `config.txt` inside the data directory and is handled by
//! [`ConfigStore`](crate::persistence::ConfigStore).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::joystick::JoystickSettings;
use crate::motor::MotorSettings;
use crate::network::NetworkSettings;
use crate::persistence::DEFAULT_HOST_NAME;
use crate::sampling::SampleLoopSettings;
use crate::sensor::SensorSettings;

const APP_DIR: &str = "robotkit";
const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("No configuration directory available on this platform")]
    NoConfigDir,

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory holding `config.txt`. Defaults to the settings directory.
    pub data_dir: Option<PathBuf>,
    /// Host name restored on first start and when switching back to robot.
    /// Must not be empty; an empty value falls back to the built-in default.
    pub default_host_name: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: None,
            default_host_name: DEFAULT_HOST_NAME.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub sampling: SampleLoopSettings,
    pub network: NetworkSettings,
    pub joystick: JoystickSettings,
    pub motor: MotorSettings,
    pub sensor: SensorSettings,
}

impl Settings {
    /// `~/.config/robotkit` on Linux
    pub fn config_dir() -> Result<PathBuf, SettingsError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(SettingsError::NoConfigDir)
    }

    /// Loads the settings from the platform config directory, writing the
    /// defaults there when no settings file exists yet.
    ///
    /// Never fails: a missing config directory, an unreadable or malformed
    /// file and a failed write of the defaults are logged and the defaults are
    /// used. Without a config directory the working directory stands in.
    pub async fn load_or_default() -> (Self, PathBuf) {
        let dir = match Self::config_dir() {
            Ok(dir) => dir,
            Err(e) => {
                warn!("{}, using the working directory", e);
                PathBuf::from(".")
            }
        };
        let settings = Self::load_from_or_default(&dir).await;
        (settings, dir)
    }

    pub async fn load_from_or_default(dir: &Path) -> Self {
        match Self::load_from(dir).await {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Using default settings: {}", e);
                Self::default()
            }
        }
    }

    pub async fn load_from(dir: &Path) -> Result<Self, SettingsError> {
        let path = dir.join(SETTINGS_FILE);

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let settings = Self::from_toml_str(&content)?;
                info!("Loaded settings from {}", path.display());
                Ok(settings)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "Settings file {} does not exist, writing defaults",
                    path.display()
                );
                let settings = Self::default();
                settings.write_to(dir).await?;
                Ok(settings)
            }
            Err(source) => Err(SettingsError::Io { path, source }),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(content)?)
    }

    pub async fn write_to(&self, dir: &Path) -> Result<(), SettingsError> {
        let content = toml::to_string_pretty(self)?;

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| SettingsError::Io {
                path: dir.to_path_buf(),
                source,
            })?;

        let path = dir.join(SETTINGS_FILE);
        tokio::fs::write(&path, content)
            .await
            .map_err(|source| SettingsError::Io {
                path: path.clone(),
                source,
            })?;
        debug!("Wrote settings to {}", path.display());
        Ok(())
    }

    /// Where `config.txt` lives
    pub fn data_dir(&self, config_dir: &Path) -> PathBuf {
        self.general
            .data_dir
            .clone()
            .unwrap_or_else(|| config_dir.to_path_buf())
    }
}
