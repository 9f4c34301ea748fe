// src/system/settings.rs

use crate::core::paths::{self, PathError};
use crate::models::Settings;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("Could not access settings file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid settings in '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Could not serialize default settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Loads `config.toml` from the application config directory, writing the
/// defaults there first if the file does not exist yet.
pub fn load_settings() -> Result<Settings, SettingsError> {
    load_settings_from(&paths::get_settings_path()?)
}

/// Same as [`load_settings`] for an explicit file.
pub fn load_settings_from(path: &Path) -> Result<Settings, SettingsError> {
    let io_error = |source| SettingsError::Io {
        path: path.display().to_string(),
        source,
    };

    if !path.exists() {
        let defaults = Settings::default();
        let toml_string = toml::to_string_pretty(&defaults)?;
        fs::write(path, toml_string).map_err(io_error)?;
        log::info!("Created default settings at '{}'", path.display());
        return Ok(defaults);
    }

    let content = fs::read_to_string(path).map_err(io_error)?;
    toml::from_str(&content).map_err(|source| SettingsError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Picks the script path: the command-line value, then the environment
/// variable, then the settings file. Blank values are skipped.
pub fn effective_script_path(
    cli_value: Option<&str>,
    env_value: Option<&str>,
    settings: &Settings,
) -> String {
    [cli_value, env_value, Some(settings.script_path.as_str())]
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
        .unwrap_or_default()
        .to_string()
}
