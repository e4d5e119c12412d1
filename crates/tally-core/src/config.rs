use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const HOME_ENV: &str = "TALLY_HOME";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Unable to resolve home directory; set TALLY_HOME to an absolute path")]
    NoHome,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct TallyConfig {
    /// Where the persisted tracker state lives. Relative paths resolve
    /// against the tally home directory.
    pub data_dir: Option<String>,
    /// Default directory for `export` when no output path is given.
    pub export_dir: Option<String>,
    /// tracing filter directive, e.g. "info" or "tally_core=debug".
    pub log: Option<String>,
}

fn non_empty_env(name: &str) -> Option<PathBuf> {
    let value = std::env::var(name).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

pub fn resolve_user_home_dir() -> Option<PathBuf> {
    non_empty_env("HOME").or_else(|| non_empty_env("USERPROFILE"))
}

pub fn resolve_tally_home() -> Result<PathBuf, ConfigError> {
    if let Some(home) = non_empty_env(HOME_ENV) {
        return Ok(home);
    }
    resolve_user_home_dir()
        .map(|home| home.join(".tally"))
        .ok_or(ConfigError::NoHome)
}

pub fn config_path(home: &Path) -> PathBuf {
    home.join("config.toml")
}

/// `Ok(None)` when there is no config file. A file that exists but cannot be
/// read or parsed is an error; callers decide whether to fall back.
pub fn load_config(home: &Path) -> Result<Option<TallyConfig>, ConfigError> {
    let path = config_path(home);
    if !path.is_file() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path)?;
    Ok(Some(toml::from_str::<TallyConfig>(&text)?))
}

fn resolve_against(home: &Path, value: Option<&str>) -> Option<PathBuf> {
    let value = value.map(str::trim).filter(|value| !value.is_empty())?;
    let path = PathBuf::from(value);
    if path.is_absolute() {
        Some(path)
    } else {
        Some(home.join(path))
    }
}

pub fn resolve_data_dir(home: &Path, config: &TallyConfig) -> PathBuf {
    resolve_against(home, config.data_dir.as_deref()).unwrap_or_else(|| home.join("data"))
}

pub fn resolve_export_dir(home: &Path, config: &TallyConfig) -> PathBuf {
    resolve_against(home, config.export_dir.as_deref()).unwrap_or_else(|| PathBuf::from("."))
}
