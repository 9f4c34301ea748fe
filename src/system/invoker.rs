// src/system/invoker.rs

use crate::CancellationToken;
use crate::constants::INVOCATION_POLL_INTERVAL_MS;
use crate::core::commons::is_valid_function_name;
use crate::models::{InvocationOutcome, Settings};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

/// Single-quote characters PowerShell accepts as string delimiters. Each one
/// is escaped by doubling it.
const SINGLE_QUOTES: [char; 5] = ['\'', '\u{2018}', '\u{2019}', '\u{201A}', '\u{201B}'];

#[derive(Error, Debug)]
pub enum InvocationError {
    #[error("'{0}' is not a valid function name.")]
    InvalidName(String),
    #[error("The script path '{0}' is not valid Unicode.")]
    NonUnicodePath(String),
    #[error("Could not start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error while waiting for the interpreter: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    ErrorStream(String),
    #[error("The interpreter exited with code {0}.")]
    NonZeroExit(i32),
    #[error("The interpreter was terminated before it could exit.")]
    Terminated,
    #[error("Timed out after {0:?}.")]
    TimedOut(Duration),
    #[error("Operation was cancelled by the user.")]
    Cancelled,
}

/// Everything read from a child that ran to completion.
struct Captured {
    stdout: String,
    stderr: String,
    status: ExitStatus,
}

/// Runs one function from a script in a fresh interpreter process.
///
/// Each call dot-sources the script and then calls the function, so nothing
/// leaks between invocations. The interpreter receives the composed command
/// as its final argument.
#[derive(Debug, Clone)]
pub struct Invoker {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl Invoker {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.interpreter, settings.interpreter_args.clone())
            .with_timeout(settings.timeout())
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Composes `. '<script>'; <name>`.
    ///
    /// The path is placed in a single-quoted literal, so no interpolation
    /// happens. The name is checked against the identifier pattern instead of
    /// being escaped.
    pub fn build_command(script: &Path, function_name: &str) -> Result<String, InvocationError> {
        if !is_valid_function_name(function_name) {
            return Err(InvocationError::InvalidName(function_name.to_string()));
        }
        let path = script
            .to_str()
            .ok_or_else(|| InvocationError::NonUnicodePath(script.display().to_string()))?;
        Ok(format!(". '{}'; {}", escape_single_quoted(path), function_name))
    }

    /// Runs `function_name` and reports the result.
    ///
    /// Never returns an error: anything that goes wrong, from an invalid name
    /// to a missing interpreter, becomes a failed [`InvocationOutcome`].
    pub async fn invoke(
        &self,
        script: &Path,
        function_name: &str,
        cancellation_token: &CancellationToken,
    ) -> InvocationOutcome {
        let started = Instant::now();
        let result = self.run(script, function_name, cancellation_token, started).await;
        let duration = started.elapsed();

        let outcome = match result {
            Ok(captured) => classify(function_name, captured, duration),
            Err(e) => InvocationOutcome::failed(function_name, e.to_string(), String::new(), None, duration),
        };
        log::debug!(
            "'{}' finished in {:?} ({:?})",
            function_name,
            outcome.duration,
            outcome.status
        );
        outcome
    }

    async fn run(
        &self,
        script: &Path,
        function_name: &str,
        cancellation_token: &CancellationToken,
        started: Instant,
    ) -> Result<Captured, InvocationError> {
        let command_line = Self::build_command(script, function_name)?;
        if cancellation_token.load(Ordering::SeqCst) {
            return Err(InvocationError::Cancelled);
        }

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(&command_line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(parent) = script.parent().filter(|p| p.is_dir()) {
            command.current_dir(dunce::simplified(parent));
        }

        log::debug!("Running '{}' with command: {}", self.program, command_line);
        let mut child = command.spawn().map_err(|source| InvocationError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        // Both pipes are drained while the child runs so a chatty function
        // cannot block on a full pipe.
        let stdout_reader = tokio::spawn(read_stream(child.stdout.take()));
        let stderr_reader = tokio::spawn(read_stream(child.stderr.take()));
        let readers = [stdout_reader.abort_handle(), stderr_reader.abort_handle()];

        // A background process that inherits the pipes keeps them open after
        // the interpreter exits, so the deadline covers the reads as well.
        let poll_interval = Duration::from_millis(INVOCATION_POLL_INTERVAL_MS);
        let stopped = {
            let finished = collect(&mut child, stdout_reader, stderr_reader);
            tokio::pin!(finished);
            loop {
                tokio::select! {
                    result = &mut finished => return result,
                    _ = tokio::time::sleep(poll_interval) => {
                        if cancellation_token.load(Ordering::SeqCst) {
                            break InvocationError::Cancelled;
                        }
                        if let Some(limit) = self.timeout {
                            if started.elapsed() >= limit {
                                break InvocationError::TimedOut(limit);
                            }
                        }
                    }
                }
            }
        };

        if matches!(child.try_wait(), Ok(None)) {
            terminate(&mut child).await;
        }
        for reader in readers {
            reader.abort();
        }
        Err(stopped)
    }
}

/// Doubles every backslash and every single-quote character.
pub fn escape_single_quoted(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || SINGLE_QUOTES.contains(&c) {
            escaped.push(c);
        }
        escaped.push(c);
    }
    escaped
}

/// Anything on the error stream means failure, whatever the exit code says.
fn classify(function_name: &str, captured: Captured, duration: Duration) -> InvocationOutcome {
    let code = captured.status.code();
    let stdout = captured.stdout.trim_end().to_string();
    let stderr = captured.stderr.trim();

    if !stderr.is_empty() {
        return InvocationOutcome::failed(
            function_name,
            InvocationError::ErrorStream(stderr.to_string()).to_string(),
            stdout,
            code,
            duration,
        );
    }
    if !captured.status.success() {
        let error = match code {
            Some(code) => InvocationError::NonZeroExit(code),
            None => InvocationError::Terminated,
        };
        return InvocationOutcome::failed(function_name, error.to_string(), stdout, code, duration);
    }
    InvocationOutcome::succeeded(function_name, stdout, code, duration)
}

async fn read_stream<R: AsyncRead + Unpin>(stream: Option<R>) -> std::io::Result<String> {
    let mut buffer = Vec::new();
    if let Some(mut stream) = stream {
        stream.read_to_end(&mut buffer).await?;
    }
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

async fn collect(
    child: &mut Child,
    stdout_reader: tokio::task::JoinHandle<std::io::Result<String>>,
    stderr_reader: tokio::task::JoinHandle<std::io::Result<String>>,
) -> Result<Captured, InvocationError> {
    let status = child.wait().await?;
    let stdout = join_reader(stdout_reader).await?;
    let stderr = join_reader(stderr_reader).await?;
    Ok(Captured {
        stdout,
        stderr,
        status,
    })
}

async fn join_reader(
    reader: tokio::task::JoinHandle<std::io::Result<String>>,
) -> Result<String, InvocationError> {
    reader
        .await
        .map_err(|e| InvocationError::Io(std::io::Error::other(e.to_string())))?
        .map_err(InvocationError::Io)
}

async fn terminate(child: &mut Child) {
    let pid = child.id();
    log::debug!("Killing interpreter process (PID: {:?})...", pid);
    if let Err(e) = child.kill().await {
        log::warn!("Failed to kill interpreter process {:?}: {}", pid, e);
    }
}
