//! Utilities Module
//!
//! Shared utilities for error handling, secret generation, and validation
//! used throughout the identity service.

pub mod error;
pub mod security;
pub mod validation;

// Re-export commonly used utilities
pub use error::{AppError, AppResult, ErrorResponse};
pub use security::*;
pub use validation::*;
