//! Fragcut Common Utilities
//!
//! Shared infrastructure for all Fragcut crates:
//! - Error types and result aliases
//! - Tracing/logging initialization
//! - Configuration loading
//! - Output naming and file publishing helpers

pub mod config;
pub mod error;
pub mod fs;
pub mod logging;

pub use config::*;
pub use error::*;
