// src/core/mod.rs

pub mod cache;
pub mod commons;
pub mod extractor;
pub mod paths;
pub mod session;
pub mod structural;
