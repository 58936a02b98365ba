//! Crisis corpus core library
//!
//! This crate provides the foundational utilities shared by the corpus
//! tooling:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management
//! - Durable key/value state in `.env` files

pub mod config;
pub mod env_file;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::AppConfig;
pub use env_file::{EnvFile, KeyValueStore};
pub use error::{AppError, AppResult};
