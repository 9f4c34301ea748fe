// src/constants.rs

/// The name of the application directory under the system config and cache directories.
pub const APP_DIR: &str = "psfunc";

/// The name of the settings file (in ~/.config/psfunc/).
pub const SETTINGS_FILENAME: &str = "config.toml";

/// Namespace prepended to every cache key.
pub const CACHE_KEY_PREFIX: &str = "psfunc-functions";

/// Extension of the files written by the persistent cache store.
pub const CACHE_ENTRY_EXTENSION: &str = "json";

/// Environment variable that overrides the configured script path.
pub const SCRIPT_ENV_VAR: &str = "PSFUNC_SCRIPT";

/// Environment variable that overrides the cache directory.
pub const CACHE_DIR_ENV_VAR: &str = "PSFUNC_CACHE_DIR";

/// Interpreter used when the settings do not name one.
#[cfg(windows)]
pub const DEFAULT_INTERPRETER: &str = "powershell.exe";
/// Interpreter used when the settings do not name one.
#[cfg(not(windows))]
pub const DEFAULT_INTERPRETER: &str = "pwsh";

/// Arguments placed before the composed command: no banner, no profile, never
/// prompt, and a relaxed execution policy scoped to this one process.
pub const DEFAULT_INTERPRETER_ARGS: &[&str] = &[
    "-NoLogo",
    "-NoProfile",
    "-NonInteractive",
    "-ExecutionPolicy",
    "Bypass",
    "-Command",
];

/// How often a running invocation checks for cancellation and timeout.
pub const INVOCATION_POLL_INTERVAL_MS: u64 = 100;
