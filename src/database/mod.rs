//! Database Module
//!
//! Connection management for the optional PostgreSQL backend.

pub mod connection;

// Re-export commonly used types
pub use connection::{run_migrations, DatabaseConfig, DatabasePool};
