//! DocuGrade Common Library
//!
//! Shared code for DocuGrade services including:
//! - Entity models and the entity-store abstraction
//! - Analyzer client abstraction
//! - Error types and handling
//! - Configuration management
//! - Authentication utilities
//! - File storage helpers
//! - Metrics and observability

pub mod analyzer;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod storage;

// Re-export commonly used types
pub use analyzer::{AnalysisOptions, Analyzer};
pub use config::AppConfig;
pub use db::{EntityStore, MemoryStore, Repository};
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
