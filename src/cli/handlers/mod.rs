// src/cli/handlers/mod.rs

// One module per CLI action.

pub mod commons;
pub mod debug_cache;
pub mod list;
pub mod pick;
pub mod reload;
pub mod run;
pub mod search;
