//! XDG path resolution for gantry configuration and data directories.

use anyhow::Result;
use std::path::PathBuf;

use super::types::Config;
use crate::constants::{APP_NAME, CONFIG_FILENAME, HISTORY_FILENAME, PERMISSIONS_FILENAME};

impl Config {
    /// Returns the platform-specific configuration directory for gantry.
    ///
    /// Returns `~/.config/gantry/` on Linux (`XDG_CONFIG_HOME/gantry`).
    ///
    /// # Errors
    ///
    /// Returns an error if the platform's config directory cannot be determined.
    pub fn config_dir() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join(APP_NAME);
        Ok(dir)
    }

    /// Returns the platform-specific data directory for gantry.
    ///
    /// Returns `~/.local/share/gantry/` on Linux. Sessions and the
    /// permission state live here.
    pub fn data_dir() -> Result<PathBuf> {
        let dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?
            .join(APP_NAME);
        Ok(dir)
    }

    /// Returns the platform-specific cache directory for gantry.
    ///
    /// Used for readline history.
    pub fn cache_dir() -> Result<PathBuf> {
        let dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine cache directory"))?
            .join(APP_NAME);
        Ok(dir)
    }

    /// Returns the full path to the gantry configuration file.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// `~/.local/share/gantry/sessions/`
    pub fn sessions_dir() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("sessions"))
    }

    /// `~/.local/share/gantry/permissions.json`
    pub fn permissions_path() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join(PERMISSIONS_FILENAME))
    }

    pub fn history_path() -> Result<PathBuf> {
        Ok(Self::cache_dir()?.join(HISTORY_FILENAME))
    }
}
