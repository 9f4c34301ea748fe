// src/bin/psfunc.rs

use clap::Parser;
use colored::*;
use psfunc::{
    cli::{Cli, dispatcher},
    system::invoker::InvocationError,
    t,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The main entry point of the `psfunc` application.
/// It sets up logging, parses arguments, dispatches to the correct handler,
/// and performs centralized error handling.
fn main() {
    // Set by the `Ctrl+C` watcher while a function is running.
    let cancellation_token = Arc::new(AtomicBool::new(false));
    env_logger::init();

    if let Err(e) = dispatcher::dispatch(Cli::parse(), cancellation_token.clone()) {
        // --- Centralized Error Handling ---
        let interrupted = cancellation_token.load(Ordering::SeqCst)
            || matches!(
                e.downcast_ref::<InvocationError>(),
                Some(InvocationError::Cancelled)
            );
        if interrupted {
            // Exit silently with the shell's code for an interrupted command.
            std::process::exit(130);
        }

        eprintln!("\n{}: {:#}", t!("main.error.prefix").red().bold(), e);
        std::process::exit(1);
    }
}
