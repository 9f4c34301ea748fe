// src/cli/handlers/commons.rs

// Shared state and helpers used by every handler.

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use colored::Colorize;
use std::env;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::{
    CancellationToken,
    constants::SCRIPT_ENV_VAR,
    core::{
        cache::FileStore,
        session::{Session, SessionError},
    },
    models::{InvocationOutcome, LoadOrigin, LoadReport, ReloadSummary, Settings},
    system::{
        invoker::InvocationError,
        settings::{self, effective_script_path},
    },
};

/// Everything a handler needs: the loaded settings, a session over the
/// persistent cache, and the runtime that drives it.
#[derive(Debug)]
pub struct AppContext {
    pub settings: Settings,
    pub script_path: String,
    pub store: Arc<FileStore>,
    pub session: Session,
    pub cancellation_token: CancellationToken,
    runtime: tokio::runtime::Runtime,
}

impl AppContext {
    pub fn new(script_override: Option<String>, cancellation_token: CancellationToken) -> Result<Self> {
        let settings = settings::load_settings()?;
        let env_script = env::var(SCRIPT_ENV_VAR).ok();
        let script_path =
            effective_script_path(script_override.as_deref(), env_script.as_deref(), &settings);

        let store = Arc::new(FileStore::open_default().context(t!("cli.error.cache_open"))?);
        let session = Session::from_settings(&settings, store.clone());

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context(t!("cli.error.runtime"))?;

        Ok(Self {
            settings,
            script_path,
            store,
            session,
            cancellation_token,
            runtime,
        })
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Points the session at the configured script and loads its names.
    pub fn configure(&self, fresh: bool) -> Result<LoadReport> {
        log::debug!("Configuring session with '{}' (fresh: {})", self.script_path, fresh);
        let result = if fresh {
            self.block_on(self.session.configure_fresh(&self.script_path))
        } else {
            self.block_on(self.session.configure(&self.script_path))
        };
        with_reload_hint(result, &self.script_path)
    }

    /// Points the session at the configured script and parses it again,
    /// without a cached or initial load.
    pub fn reload(&self) -> Result<ReloadSummary> {
        log::debug!("Reloading '{}'", self.script_path);
        self.block_on(self.session.set_script(&self.script_path))?;
        with_reload_hint(self.block_on(self.session.reload()), &self.script_path)
    }

    /// Runs `name`, printing its output. `Ctrl+C` stops the child and is
    /// reported as [`InvocationError::Cancelled`].
    pub fn run_function(&self, name: &str) -> Result<()> {
        let outcome = self.block_on(async {
            let token = self.cancellation_token.clone();
            let watcher = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    token.store(true, Ordering::SeqCst);
                }
            });
            let outcome = self.session.run_function(name, &self.cancellation_token).await;
            watcher.abort();
            outcome
        });
        report_outcome(&outcome, &self.cancellation_token)
    }
}

/// Parses handler arguments. `--help` prints and exits like a top-level flag.
pub fn parse_args<T: Parser>(args: &[String]) -> Result<T> {
    match T::try_parse_from(args) {
        Ok(parsed) => Ok(parsed),
        Err(e)
            if matches!(
                e.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            ) =>
        {
            e.exit()
        }
        Err(e) => Err(e.into()),
    }
}

/// Prints the captured output to stdout and the status line to stderr.
/// A failed outcome becomes an error carrying the interpreter's message.
pub fn report_outcome(outcome: &InvocationOutcome, cancellation_token: &CancellationToken) -> Result<()> {
    if !outcome.stdout.is_empty() {
        println!("{}", outcome.stdout);
    }

    if outcome.is_success() {
        eprintln!(
            "{}",
            format!(
                t!("run.success"),
                name = outcome.function_name,
                seconds = format_seconds(outcome.duration)
            )
            .dimmed()
        );
        return Ok(());
    }

    if cancellation_token.load(Ordering::SeqCst) {
        return Err(InvocationError::Cancelled.into());
    }
    let message = outcome.error.as_deref().unwrap_or(t!("run.error.unknown"));
    Err(anyhow!(
        t!("run.error.failed"),
        name = outcome.function_name.cyan(),
        message = message
    ))
}

/// Extraction failures name `psfunc reload` as the way to retry once the
/// script is fixed.
fn with_reload_hint<T>(result: Result<T, SessionError>, script: &str) -> Result<T> {
    result.map_err(|e| {
        let needs_hint = matches!(e, SessionError::Extraction(_));
        let error = anyhow::Error::new(e);
        if needs_hint {
            error.context(format!(t!("cli.error.extraction_hint"), script = script))
        } else {
            error
        }
    })
}

/// Prints one name per line, with the list's provenance on top.
pub fn print_names(names: &[String], origin: Option<LoadOrigin>, script: &str) {
    if let Some(origin) = origin {
        println!(
            "{}",
            format!(
                t!("list.header"),
                count = names.len(),
                script = script,
                origin = origin
            )
            .dimmed()
        );
    }
    for name in names {
        println!("  {}", name.cyan());
    }
}

fn format_seconds(duration: std::time::Duration) -> String {
    format!("{:.2}", duration.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::RunArgs;
    use crate::models::InvocationOutcome;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[test]
    fn test_parse_args_reports_missing_values() {
        let result = parse_args::<RunArgs>(&[]);
        assert!(result.is_err());

        let parsed = parse_args::<RunArgs>(&["Get-Status".to_string()]).unwrap();
        assert_eq!(parsed.name, "Get-Status");
    }

    #[test]
    fn test_failed_outcome_carries_the_error_stream() {
        let token = Arc::new(AtomicBool::new(false));
        let outcome = InvocationOutcome::failed(
            "Get-Status",
            "access denied",
            String::new(),
            Some(1),
            Duration::from_millis(5),
        );

        let err = report_outcome(&outcome, &token).unwrap_err();

        assert!(err.to_string().contains("access denied"));
        assert!(err.downcast_ref::<InvocationError>().is_none());
    }

    #[test]
    fn test_failure_after_ctrl_c_is_a_cancellation() {
        let token = Arc::new(AtomicBool::new(true));
        let outcome = InvocationOutcome::failed(
            "Hang",
            "Operation was cancelled by the user.",
            String::new(),
            None,
            Duration::from_millis(5),
        );

        let err = report_outcome(&outcome, &token).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<InvocationError>(),
            Some(InvocationError::Cancelled)
        ));
    }

    #[test]
    fn test_extraction_failures_suggest_a_reload() {
        let extraction: Result<(), SessionError> = Err(SessionError::Extraction(
            crate::core::extractor::ExtractionError::Exhausted {
                details: "structural: syntax error on line 3".into(),
            },
        ));
        let unconfigured: Result<(), SessionError> = Err(SessionError::NotConfigured);

        let hinted = format!("{:#}", with_reload_hint(extraction, "profile.ps1").unwrap_err());
        let plain = format!("{:#}", with_reload_hint(unconfigured, "profile.ps1").unwrap_err());

        assert!(hinted.contains("psfunc reload"));
        assert!(hinted.contains("syntax error on line 3"));
        assert!(!plain.contains("psfunc reload"));
    }

    #[test]
    fn test_success_is_ok() {
        let token = Arc::new(AtomicBool::new(false));
        let outcome =
            InvocationOutcome::succeeded("Get-Status", "OK".into(), Some(0), Duration::from_millis(5));

        assert!(report_outcome(&outcome, &token).is_ok());
    }
}
