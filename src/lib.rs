//! Pipeline orchestrator - CI/CD execution orchestration
//!
//! This library tracks pipeline executions per project, binds platforms to
//! execution engines and ships an in-process simulation engine that drives
//! runs through staged, cancellable execution while synthesizing logs and
//! resource metrics from a CI descriptor.

pub mod ci;
pub mod config;
pub mod core;
pub mod error;

// Re-export commonly used types
pub use error::{AppError, Result};
