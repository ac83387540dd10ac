//! Service Layer
//!
//! Business logic for the identity service: OTP lifecycle, OAuth state and
//! exchange, identity reconciliation and token issuance.

pub mod auth_service;
pub mod directory;
pub mod email_service;
pub mod google;
pub mod identity;
pub mod jwt;
pub mod oauth_service;
pub mod oauth_state;
pub mod otp_service;

// Re-export services
pub use auth_service::AuthService;
pub use directory::{DirectoryError, InMemoryUserDirectory, PgUserDirectory, UserDirectory};
pub use email_service::{EmailGateway, LogEmailGateway, SmtpEmailGateway};
pub use google::{GoogleIdentityProvider, IdentityProvider, ProviderError};
pub use identity::{IdentityError, IdentityReconciler, Reconciled};
pub use jwt::{CredentialIssuer, JwtService, TokenError};
pub use oauth_service::{OAuthFlowError, OAuthService};
pub use oauth_state::OAuthStateManager;
pub use otp_service::{OtpService, OtpServiceError};
