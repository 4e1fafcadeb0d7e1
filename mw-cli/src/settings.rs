//! mwctl settings

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mw_driver::DriverConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Settings stored in `settings.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Connection and polling settings for the driver
    #[serde(default)]
    pub driver: DriverConfig,
}

impl Settings {
    /// Get the config directory path
    ///
    /// Uses `$XDG_CONFIG_HOME/mwctl` when set, `~/.config/mwctl` otherwise.
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("mwctl"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("mwctl"))
    }

    /// Default settings file path
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from `path`, or from the default location
    ///
    /// A missing or unreadable file yields the defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::default_path) else {
            return Self::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(s) => Self::parse(&s).unwrap_or_else(|e| {
                warn!("Ignoring {}: {}", path.display(), e);
                Self::default()
            }),
            Err(e) => {
                debug!("No settings at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    fn parse(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Save settings to `path`, creating its directory
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;
        Ok(())
    }
}
