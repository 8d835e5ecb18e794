//! Config file discovery.
//!
//! Resolution order:
//! 1. An explicit path (e.g. `--config`), which must exist
//! 2. `$RESPONDER_CONFIG_DIR/responder.toml`
//! 3. `~/.config/responder/responder.toml` (platform config dir)
//! 4. Built-in defaults

use std::path::{Path, PathBuf};

use crate::{ConfigError, ResponderConfig, Result};

/// Default config filename within the config directory.
const USER_CONFIG_FILE: &str = "responder.toml";

/// Default persisted credential filename within the config directory.
pub const TOKEN_FILE: &str = "auth-response.json";

/// Application name for XDG directory resolution.
const APP_NAME: &str = "responder";

/// Environment variable to override the config directory.
const CONFIG_DIR_ENV: &str = "RESPONDER_CONFIG_DIR";

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The effective configuration.
    pub config: ResponderConfig,
    /// File the config was read from, if any.
    pub source: Option<PathBuf>,
}

/// Load configuration.
///
/// An explicit path must exist and parse. Without one, the user config file
/// is used when present, otherwise defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        return Ok(LoadedConfig {
            config: load_config_file(path)?,
            source: Some(path.to_path_buf()),
        });
    }

    if let Some(path) = xdg_config_path()
        && path.is_file()
    {
        return Ok(LoadedConfig {
            config: load_config_file(&path)?,
            source: Some(path),
        });
    }

    Ok(LoadedConfig {
        config: ResponderConfig::default(),
        source: None,
    })
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<ResponderConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    ResponderConfig::from_toml(&contents)
}

/// Save configuration to a file.
///
/// Creates parent directories if they don't exist.
pub fn save_config(config: &ResponderConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let contents = config.to_toml()?;
    std::fs::write(path, contents).map_err(|e| ConfigError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

/// Get the user config file path.
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// Get the config directory for responder.
///
/// Checks `RESPONDER_CONFIG_DIR` first, then falls back to the platform default.
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}
