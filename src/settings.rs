// Application settings
// A small JSON document under the platform data directory, loaded at startup
// and written back on change; absence means defaults

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to locate application data directory")]
    NoDataDir,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Directory for downloaded transcription model weights
    #[serde(default = "default_model_cache")]
    pub model_cache: PathBuf,

    /// Prefer GPU execution when separating and transcribing
    #[serde(default)]
    pub gpu: bool,
}

fn default_model_cache() -> PathBuf {
    PathBuf::from("models")
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            model_cache: default_model_cache(),
            gpu: false,
        }
    }
}

/// Location of the settings document
pub fn settings_path() -> Result<PathBuf, SettingsError> {
    let data_dir = dirs::data_dir().ok_or(SettingsError::NoDataDir)?;
    let app_dir = data_dir.join("stemscribe");
    fs::create_dir_all(&app_dir)?;
    Ok(app_dir.join("settings.json"))
}

/// Load settings from the default location; an absent file yields defaults
pub fn load() -> Result<Settings, SettingsError> {
    load_from(&settings_path()?)
}

/// Persist settings to the default location
pub fn save(settings: &Settings) -> Result<(), SettingsError> {
    save_to(settings, &settings_path()?)
}

pub fn load_from(path: &Path) -> Result<Settings, SettingsError> {
    if !path.exists() {
        return Ok(Settings::default());
    }

    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

pub fn save_to(settings: &Settings, path: &Path) -> Result<(), SettingsError> {
    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json)?;
    Ok(())
}
