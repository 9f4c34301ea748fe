// src/core/paths.rs

use crate::constants::{APP_DIR, CACHE_DIR_ENV_VAR, SETTINGS_FILENAME};
use crate::models::ScriptLocation;
use lazy_static::lazy_static;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

lazy_static! {
    static ref APP_CONFIG_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);
}

#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not find system config directory.")]
    ConfigDirNotFound,
    #[error("Could not find system cache directory.")]
    CacheDirNotFound,
    #[error("Could not create directory at '{path}': {source}")]
    DirCreation {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors produced while turning the configured script path into a location.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The setting is missing or blank.
    #[error("No script path is configured. Set 'script_path' in the settings or pass --script.")]
    Configuration,
    /// Nothing exists at the expanded path.
    #[error("Script not found: '{path}'")]
    NotFound { path: String },
    /// Something exists at the path, but it is not a regular file.
    #[error("'{path}' is not a regular file.")]
    NotAFile { path: String },
    #[error("Could not resolve '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Returns the path to the configuration directory (`~/.config/psfunc`).
/// Creates it if it doesn't exist.
///
/// This function is memoized: the first call computes and caches the path,
/// subsequent calls return the cached value instantly.
pub fn get_app_config_dir() -> Result<PathBuf, PathError> {
    let mut cached_path_guard = APP_CONFIG_DIR
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    if let Some(path) = &*cached_path_guard {
        return Ok(path.clone());
    }

    let config_path = dirs::config_dir()
        .ok_or(PathError::ConfigDirNotFound)?
        .join(APP_DIR);
    ensure_dir(&config_path)?;

    *cached_path_guard = Some(config_path.clone());
    Ok(config_path)
}

/// Returns the path to the settings file inside the configuration directory.
pub fn get_settings_path() -> Result<PathBuf, PathError> {
    get_app_config_dir().map(|dir| dir.join(SETTINGS_FILENAME))
}

/// Returns the directory used by the persistent cache store, honouring
/// `PSFUNC_CACHE_DIR`. Creates it if it doesn't exist.
pub fn get_cache_dir() -> Result<PathBuf, PathError> {
    let cache_path = match std::env::var_os(CACHE_DIR_ENV_VAR) {
        Some(dir) if !dir.is_empty() => expand_home(&dir.to_string_lossy()),
        _ => dirs::cache_dir()
            .ok_or(PathError::CacheDirNotFound)?
            .join(APP_DIR),
    };
    ensure_dir(&cache_path)?;
    Ok(cache_path)
}

fn ensure_dir(path: &Path) -> Result<(), PathError> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| PathError::DirCreation {
            path: path.display().to_string(),
            source: e,
        })?;
    }
    Ok(())
}

/// Expands a leading `~` to the user's home directory. Only the first
/// character is considered; a `~` anywhere else is left untouched.
pub fn expand_home(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

/// Resolves the configured script path to a canonical, absolute path.
///
/// # Errors
/// - [`ResolveError::Configuration`] if `raw` is blank.
/// - [`ResolveError::NotFound`] if nothing exists at the expanded path.
/// - [`ResolveError::NotAFile`] if the path names a directory or other non-file.
pub async fn resolve(raw: &str) -> Result<ScriptLocation, ResolveError> {
    if raw.trim().is_empty() {
        return Err(ResolveError::Configuration);
    }

    let expanded = expand_home(raw);
    log::debug!("Resolving script path '{}' -> '{}'", raw, expanded.display());

    let metadata = match tokio::fs::metadata(&expanded).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ResolveError::NotFound {
                path: expanded.display().to_string(),
            });
        }
        Err(e) => {
            return Err(ResolveError::Io {
                path: expanded.display().to_string(),
                source: e,
            });
        }
    };

    if !metadata.is_file() {
        return Err(ResolveError::NotAFile {
            path: expanded.display().to_string(),
        });
    }

    let canonical = tokio::fs::canonicalize(&expanded)
        .await
        .map_err(|e| ResolveError::Io {
            path: expanded.display().to_string(),
            source: e,
        })?;
    // Strip `\\?\` on Windows so the path stays readable by the interpreter.
    let canonical = dunce::simplified(&canonical).to_path_buf();
    log::debug!("Script resolved to '{}'", canonical.display());

    Ok(ScriptLocation {
        raw: raw.to_string(),
        resolved: Some(canonical),
    })
}
