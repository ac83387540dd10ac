//! Data Models Module
//!
//! Records held in the ephemeral store and the user directory, plus the
//! request/response types of the HTTP API.

pub mod auth;
pub mod oauth;
pub mod otp;
pub mod requests;
pub mod user;

// Re-export commonly used types
pub use auth::*;
pub use oauth::*;
pub use otp::*;
pub use requests::*;
pub use user::*;
