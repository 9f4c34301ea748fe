//! # psfunc
//!
//! Discovers the zero-argument functions defined in a PowerShell script, keeps the
//! discovered list in a freshness-aware cache, and runs a chosen function in an
//! external interpreter.
//!
//! The crate is split the same way the binary uses it:
//!
//! - **`core`**: path resolution, name extraction, the freshness cache and the
//!   [`core::session::Session`] that binds them together.
//! - **`system`**: the boundary with the operating system (child processes and
//!   the settings file).
//! - **`cli`**: the terminal host that drives a session.

include!(concat!(env!("OUT_DIR"), "/translations.rs"));

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Shared flag set when the user asks to abort (e.g. `Ctrl+C`). Long-running
/// operations poll it and stop as soon as it flips to `true`.
pub type CancellationToken = Arc<AtomicBool>;

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod system;
