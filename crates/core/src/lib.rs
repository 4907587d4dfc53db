//! Reasoner Core Library
//!
//! This crate provides the foundational utilities shared by every Reasoner crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{AppConfig, SearchBackend, SearchSettings};
pub use error::{AppError, AppResult};
