//! Identity Service Library
//!
//! Sign-in flows for a user identity service: passwordless email sign-in
//! with one-time passcodes, OTP-gated password registration, Google OAuth
//! login, and short-lived access tokens with single-use refresh tokens.
//!
//! # Features
//!
//! - **Email OTP**: numeric codes with expiry, attempt limits and supersession
//! - **Google OAuth**: single-use state tokens and a callback that never
//!   surfaces protocol errors to the browser
//! - **Identity Reconciliation**: one local identity per email or federated id
//! - **Token Rotation**: HS256 JWT pairs whose refresh token works exactly once
//! - **Pluggable Storage**: in-memory or PostgreSQL backends behind traits
//! - **Flexible Router**: enable only the endpoints a deployment needs
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use identity_service::{
//!     api::{AppState, RouterBuilder},
//!     config::{AuthFlowConfig, JwtConfig},
//!     service::{
//!         AuthService, IdentityReconciler, InMemoryUserDirectory, JwtService,
//!         LogEmailGateway, OtpService,
//!     },
//!     store::MemoryStore,
//!     utils::security::OsSecretGenerator,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!     let jwt_service = Arc::new(JwtService::new(store.clone(), &JwtConfig::from_env()?));
//!     let otp_service = Arc::new(OtpService::new(
//!         store,
//!         Arc::new(LogEmailGateway),
//!         Arc::new(OsSecretGenerator),
//!         AuthFlowConfig::default(),
//!     ));
//!     let reconciler = Arc::new(IdentityReconciler::new(Arc::new(InMemoryUserDirectory::new())));
//!
//!     let app_state = AppState {
//!         auth_service: Arc::new(AuthService::new(otp_service, reconciler, jwt_service.clone())),
//!         jwt_service,
//!         oauth_service: None,
//!     };
//!
//!     let app = RouterBuilder::with_passwordless_routes()
//!         .build()
//!         .with_state(app_state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//!     axum::serve(listener, app).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **API Layer**: HTTP handlers and configurable route definitions
//! - **Service Layer**: OTP lifecycle, OAuth flow, reconciliation, tokens
//! - **Store**: expiring key/value entries with compare-and-swap updates
//! - **Models**: stored records and request/response structures
//! - **Database**: optional PostgreSQL pool and migrations
//! - **Utils**: secrets, validation and error handling

/// HTTP API layer with handlers and configurable routing
pub mod api;

/// Configuration management for all service settings
pub mod config;

/// Database connection management and configuration
pub mod database;

/// Data models and request/response structures
pub mod models;

/// Sign-in flows and their collaborators
pub mod service;

/// Expiring key/value storage for codes, states and refresh sessions
pub mod store;

/// Shared utilities for security, validation, and error handling
pub mod utils;

// Re-export commonly used types for convenient access
pub use api::{create_routes, AppState, RouterBuilder};
pub use models::{
    auth::{SignIn, TokenPair},
    oauth::{OAuthCallbackQuery, OAuthInitResponse, ProviderProfile},
    otp::{OtpDispatch, OtpRecord, PendingRegistration, VerifiedOtp, VerifyResult},
    user::{RegistrationMethod, UserIdentity},
};
pub use service::{
    AuthService, IdentityReconciler, JwtService, OAuthService, OAuthStateManager, OtpService,
};
pub use store::{EphemeralStore, MemoryStore, PgEphemeralStore};
pub use utils::error::{AppError, AppResult, ErrorResponse};

// Re-export database utilities for configuration
pub use database::{DatabaseConfig, DatabasePool};

// Re-export configuration system
pub use config::{
    env, AppConfig, AuthFlowConfig, EmailConfig, ExecutionMode, GoogleOAuthConfig, JwtConfig,
    ServerConfig,
};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
