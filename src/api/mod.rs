//! API Layer
//!
//! HTTP API endpoints and request handling for the identity service.

pub mod handlers;
pub mod oauth_handlers;
pub mod routes;

// Re-export commonly used types
pub use handlers::AppState;
pub use routes::{create_routes, RouterBuilder};
