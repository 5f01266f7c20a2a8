/// Canonical file paths for earkey data files.
///
/// Everything lives under the platform config directory:
///   - config.toml     Debounce window and mapping file location.
///   - mappings.ekmap  Trigger definitions (default location).
///   - status.toml     Written by the daemon, read by status bars and scripts.
use std::path::PathBuf;

use anyhow::{Context, Result};

const APP_DIR_NAME: &str = "earkey";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const MAPPINGS_FILE_NAME: &str = "mappings.ekmap";
pub const STATUS_FILE_NAME: &str = "status.toml";

/// Returns the earkey config directory, e.g. `~/.config/earkey` or `%APPDATA%\earkey`.
pub fn app_config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir().context("no config directory for this platform")?;
    Ok(base.join(APP_DIR_NAME))
}

pub fn config_file_path() -> Result<PathBuf> {
    Ok(app_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Mapping file used when config.toml does not name one.
pub fn default_mappings_path() -> Result<PathBuf> {
    Ok(app_config_dir()?.join(MAPPINGS_FILE_NAME))
}

pub fn status_file_path() -> Result<PathBuf> {
    Ok(app_config_dir()?.join(STATUS_FILE_NAME))
}
