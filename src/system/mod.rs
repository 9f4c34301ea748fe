//! # System Interaction Layer
//!
//! The boundary between the core logic and the operating system.
//!
//! ## Modules
//!
//! - **`invoker`**: runs one script function in a fresh interpreter process,
//!   capturing both output streams, with timeout and `Ctrl+C` cancellation.
//! - **`settings`**: loads `config.toml`, creating it with defaults on first use.

pub mod invoker;
pub mod settings;
