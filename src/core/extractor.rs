//! # Name Extractor
//!
//! Produces the ordered list of zero-argument function names defined in a
//! script. Every strategy implements [`NameSource`]; the [`NameExtractor`] only
//! decides which sources to try and in which order:
//!
//! 1. [`StructuralSource`] parses the script and is authoritative. A successful
//!    parse that finds nothing is a valid answer and is returned as-is.
//! 2. [`TextualSource`] is tried only when the structural parse fails.
//!
//! If every selected source fails, the messages of all of them are combined
//! into a single [`ExtractionError::Exhausted`].

use crate::core::commons::dedup_first_seen;
use crate::core::structural::StructuralSource;
use crate::models::{ExtractionResult, ExtractionStrategy, StrategyPreference};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::path::Path;
use thiserror::Error;

lazy_static! {
    /// `function|filter`, a name, an optional empty `()` that may span lines,
    /// then the opening brace of the body.
    static ref DEFINITION_RE: Regex = Regex::new(
        r"(?mi)^[ \t]*(?:function|filter)[ \t]+([A-Za-z_][A-Za-z0-9_-]*)\s*(?:\(\s*\))?\s*\{"
    )
    .expect("definition pattern is valid");
}

/// Why a single source could not produce names.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("the PowerShell grammar could not be loaded: {0}")]
    Grammar(String),
    #[error("syntax error on line {line}")]
    Syntax { line: usize },
    #[error("{0}")]
    Other(String),
}

/// Errors returned by [`NameExtractor::extract`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Could not read '{path}': {message}")]
    Read { path: String, message: String },
    #[error("Could not extract function names ({details})")]
    Exhausted { details: String },
    #[error("No extraction strategy is available for the '{preference:?}' preference.")]
    NoStrategy { preference: StrategyPreference },
}

/// A strategy that turns script text into function names.
///
/// Implementations return names in order of first appearance, without
/// duplicates.
pub trait NameSource: Send + Sync + fmt::Debug {
    fn strategy(&self) -> ExtractionStrategy;

    fn extract(&self, source: &str) -> Result<Vec<String>, SourceError>;
}

/// Regex scan over the raw text. Cannot see comments or strings, so it is
/// only used when the structural parse is unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextualSource;

impl NameSource for TextualSource {
    fn strategy(&self) -> ExtractionStrategy {
        ExtractionStrategy::Textual
    }

    fn extract(&self, source: &str) -> Result<Vec<String>, SourceError> {
        let names = DEFINITION_RE
            .captures_iter(source)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());
        Ok(dedup_first_seen(names))
    }
}

/// Runs the configured sources in order until one succeeds.
#[derive(Debug)]
pub struct NameExtractor {
    sources: Vec<Box<dyn NameSource>>,
}

impl Default for NameExtractor {
    fn default() -> Self {
        Self::new(vec![Box::new(StructuralSource), Box::new(TextualSource)])
    }
}

impl NameExtractor {
    /// Creates an extractor over `sources`, tried in the given order.
    pub fn new(sources: Vec<Box<dyn NameSource>>) -> Self {
        Self { sources }
    }

    /// Reads `path` and extracts its function names.
    ///
    /// # Errors
    /// [`ExtractionError::Read`] if the file cannot be read as UTF-8, otherwise
    /// whatever [`Self::extract_from_str`] returns.
    pub async fn extract(
        &self,
        path: &Path,
        preference: StrategyPreference,
    ) -> Result<ExtractionResult, ExtractionError> {
        let read_error = |message: String| ExtractionError::Read {
            path: path.display().to_string(),
            message,
        };

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| read_error(e.to_string()))?;
        let content = String::from_utf8(bytes).map_err(|e| read_error(e.to_string()))?;
        let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

        let result = self.extract_from_str(content, preference)?;
        log::debug!(
            "Extracted {} function(s) from '{}' using the {} strategy",
            result.names.len(),
            path.display(),
            result.strategy
        );
        Ok(result)
    }

    /// Extracts function names from script text.
    ///
    /// # Errors
    /// [`ExtractionError::Exhausted`] when every selected source fails, with
    /// each source's message; [`ExtractionError::NoStrategy`] when no source
    /// matches `preference`.
    pub fn extract_from_str(
        &self,
        content: &str,
        preference: StrategyPreference,
    ) -> Result<ExtractionResult, ExtractionError> {
        let mut failures = Vec::new();

        for source in self.sources.iter().filter(|s| allows(preference, s.strategy())) {
            match source.extract(content) {
                Ok(names) => {
                    if !failures.is_empty() {
                        log::warn!(
                            "Fell back to the {} strategy after: {}",
                            source.strategy(),
                            failures.join("; ")
                        );
                    }
                    return Ok(ExtractionResult {
                        names,
                        strategy: source.strategy(),
                    });
                }
                Err(e) => {
                    log::debug!("The {} strategy failed: {}", source.strategy(), e);
                    failures.push(format!("{}: {}", source.strategy(), e));
                }
            }
        }

        if failures.is_empty() {
            return Err(ExtractionError::NoStrategy { preference });
        }
        Err(ExtractionError::Exhausted {
            details: failures.join("; "),
        })
    }
}

fn allows(preference: StrategyPreference, strategy: ExtractionStrategy) -> bool {
    match preference {
        StrategyPreference::Auto => true,
        StrategyPreference::Structural => strategy == ExtractionStrategy::Structural,
        StrategyPreference::Textual => strategy == ExtractionStrategy::Textual,
    }
}
