//! API Route Definitions
//!
//! HTTP routes and their handlers, assembled with a builder so that a
//! deployment can expose only the sign-in methods it supports.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::*;
use super::oauth_handlers::{handle_google_callback, initiate_google_oauth};

/// Builder for creating API routes with configurable endpoints
///
/// Every endpoint starts disabled. Use the preset constructors for common
/// deployments, or toggle individual endpoints.
#[derive(Default)]
pub struct RouterBuilder {
    /// GET /health
    health_check: bool,
    /// POST /auth/otp/send and POST /auth/otp/resend
    send_otp: bool,
    /// POST /auth/otp/verify
    verify_otp: bool,
    /// POST /auth/register
    register: bool,
    /// POST /auth/login
    password_login: bool,
    /// POST /auth/token/refresh
    refresh_token: bool,
    /// GET /auth/google/init and GET /auth/google/callback
    google_oauth: bool,
}

impl RouterBuilder {
    /// Creates a new router builder with all routes disabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a router builder with all routes enabled
    pub fn with_all_routes() -> Self {
        Self {
            health_check: true,
            send_otp: true,
            verify_otp: true,
            register: true,
            password_login: true,
            refresh_token: true,
            google_oauth: true,
        }
    }

    /// Passwordless email sign-in only
    ///
    /// Password registration, password login and Google OAuth stay disabled.
    pub fn with_passwordless_routes() -> Self {
        Self {
            health_check: true,
            send_otp: true,
            verify_otp: true,
            refresh_token: true,
            ..Self::default()
        }
    }

    /// Creates a router with only the health check endpoint
    pub fn with_minimal_routes() -> Self {
        Self {
            health_check: true,
            ..Self::default()
        }
    }

    /// Enables or disables the health check endpoint (GET /health)
    pub fn health_check(mut self, enabled: bool) -> Self {
        self.health_check = enabled;
        self
    }

    /// Enables or disables sending and re-sending codes
    pub fn send_otp(mut self, enabled: bool) -> Self {
        self.send_otp = enabled;
        self
    }

    /// Enables or disables code verification (POST /auth/otp/verify)
    pub fn verify_otp(mut self, enabled: bool) -> Self {
        self.verify_otp = enabled;
        self
    }

    /// Enables or disables password registration (POST /auth/register)
    ///
    /// Registration still finishes through code verification, so this is
    /// only useful together with `verify_otp`.
    pub fn register(mut self, enabled: bool) -> Self {
        self.register = enabled;
        self
    }

    /// Enables or disables password sign-in (POST /auth/login)
    pub fn password_login(mut self, enabled: bool) -> Self {
        self.password_login = enabled;
        self
    }

    /// Enables or disables the token refresh endpoint (POST /auth/token/refresh)
    pub fn refresh_token(mut self, enabled: bool) -> Self {
        self.refresh_token = enabled;
        self
    }

    /// Enables or disables the Google OAuth endpoints
    ///
    /// Requests fail with a configuration error when the application state
    /// carries no OAuth service.
    pub fn google_oauth(mut self, enabled: bool) -> Self {
        self.google_oauth = enabled;
        self
    }

    /// Builds the Axum router with the configured routes
    pub fn build(self) -> Router<AppState> {
        let mut router = Router::new();

        if self.health_check {
            router = router.route("/health", get(health_check));
        }

        if self.send_otp {
            router = router
                .route("/auth/otp/send", post(send_otp))
                .route("/auth/otp/resend", post(resend_otp));
        }

        if self.verify_otp {
            router = router.route("/auth/otp/verify", post(verify_otp));
        }

        if self.register {
            router = router.route("/auth/register", post(register));
        }

        if self.password_login {
            router = router.route("/auth/login", post(login));
        }

        if self.refresh_token {
            router = router.route("/auth/token/refresh", post(refresh_token));
        }

        if self.google_oauth {
            router = router
                .route("/auth/google/init", get(initiate_google_oauth))
                .route("/auth/google/callback", get(handle_google_callback));
        }

        router
    }
}

/// Creates all API routes
pub fn create_routes() -> Router<AppState> {
    RouterBuilder::with_all_routes().build()
}
