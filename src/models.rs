// src/models.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

// --- SCRIPT LOCATION ---

/// The script path as configured by the user, together with its resolved form.
///
/// A location is produced by [`crate::core::paths::resolve`] and is never reused
/// once the configured value changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLocation {
    /// The value exactly as it came from the configuration.
    pub raw: String,
    /// Canonical absolute path. Present only when resolution succeeded.
    pub resolved: Option<PathBuf>,
}

impl ScriptLocation {
    /// Returns the canonical path, if the location was resolved.
    pub fn path(&self) -> Option<&Path> {
        self.resolved.as_deref()
    }
}

// --- EXTRACTION ---

/// Which strategy produced an extraction result.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStrategy {
    /// Token and block-structure parse of the script.
    Structural,
    /// Regular-expression scan of the raw text.
    Textual,
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structural => f.write_str("structural"),
            Self::Textual => f.write_str("textual"),
        }
    }
}

/// Which strategies the extractor is allowed to use.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StrategyPreference {
    /// Structural first, textual only if the structural parse fails.
    #[default]
    Auto,
    /// Structural only.
    Structural,
    /// Textual only.
    Textual,
}

/// Ordered, de-duplicated function names plus the strategy that found them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    pub names: Vec<String>,
    pub strategy: ExtractionStrategy,
}

// --- CACHE ---

/// How cache keys are derived for a script.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheKeyMode {
    /// `<prefix>-<path>-<mtime>`: any edit to the script invalidates the entry.
    #[default]
    Modified,
    /// `<prefix>-<path>`: the entry lives until an explicit reload.
    Fixed,
}

/// A single persisted cache record. The payload is the JSON-encoded name list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub payload: String,
}

// --- INVOCATION ---

/// Final status of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationStatus {
    Succeeded,
    Failed,
}

/// The structured result of running one function. Owned by whoever asked for
/// the invocation; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationOutcome {
    pub function_name: String,
    pub status: InvocationStatus,
    /// Captured standard output, trailing whitespace removed.
    pub stdout: String,
    /// Error stream text or a description of why the invocation failed.
    pub error: Option<String>,
    /// Exit code of the child, when it ran to completion.
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

impl InvocationOutcome {
    pub fn succeeded(
        function_name: impl Into<String>,
        stdout: String,
        exit_code: Option<i32>,
        duration: Duration,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            status: InvocationStatus::Succeeded,
            stdout,
            error: None,
            exit_code,
            duration,
        }
    }

    pub fn failed(
        function_name: impl Into<String>,
        error: impl Into<String>,
        stdout: String,
        exit_code: Option<i32>,
        duration: Duration,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            status: InvocationStatus::Failed,
            stdout,
            error: Some(error.into()),
            exit_code,
            duration,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == InvocationStatus::Succeeded
    }
}

// --- SESSION STATE ---

/// Lifecycle of the configured script path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PathState {
    #[default]
    Unconfigured,
    Resolving {
        raw: String,
    },
    Ready(ScriptLocation),
    Invalid {
        raw: String,
        message: String,
    },
}

/// Lifecycle of the name list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Loaded,
    Failed {
        message: String,
    },
}

/// Where the names returned by a load came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOrigin {
    Cache,
    Extracted(ExtractionStrategy),
}

impl fmt::Display for LoadOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => f.write_str("cache"),
            Self::Extracted(strategy) => write!(f, "{} parse", strategy),
        }
    }
}

/// Result of a successful `load_names`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub names: Vec<String>,
    pub origin: LoadOrigin,
}

/// Result of a successful `reload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadSummary {
    pub count: usize,
    pub origin: LoadOrigin,
}

/// A point-in-time snapshot of a session, shaped for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionView {
    pub path: PathState,
    pub load: LoadState,
    pub names: Vec<String>,
    pub active_invocations: usize,
}

impl SessionView {
    pub fn is_loading(&self) -> bool {
        matches!(self.path, PathState::Resolving { .. }) || self.load == LoadState::Loading
    }

    /// The message to show in an empty state, if the last step failed.
    pub fn last_error(&self) -> Option<&str> {
        match (&self.path, &self.load) {
            (PathState::Invalid { message, .. }, _) => Some(message),
            (_, LoadState::Failed { message }) => Some(message),
            _ => None,
        }
    }
}

// --- SETTINGS ---

/// User settings, read from `config.toml`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Path to the PowerShell script. May start with `~`.
    pub script_path: String,
    /// Interpreter binary.
    pub interpreter: String,
    /// Arguments placed before the composed command string.
    pub interpreter_args: Vec<String>,
    pub strategy: StrategyPreference,
    pub cache_key: CacheKeyMode,
    /// Upper bound for one invocation. `None` waits indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            script_path: String::new(),
            interpreter: crate::constants::DEFAULT_INTERPRETER.to_string(),
            interpreter_args: crate::constants::DEFAULT_INTERPRETER_ARGS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            strategy: StrategyPreference::default(),
            cache_key: CacheKeyMode::default(),
            timeout_secs: None,
        }
    }
}

impl Settings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
