//! Configuration Module
//!
//! Centralized configuration for the identity service. Debug code exposure,
//! redirect URIs and TTLs live in explicit structs that are handed to the
//! services at construction time.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::database::DatabaseConfig;
use crate::utils::validation::{MAX_OTP_DIGITS, MIN_OTP_DIGITS};

/// Environment variable helpers
pub mod env {
    use std::env;

    use super::ConfigError;

    /// Get environment variable as string with default
    pub fn get_string(key: &str, default: &str) -> String {
        env::var(key).unwrap_or_else(|_| default.to_string())
    }

    /// Get environment variable as boolean with default
    pub fn get_bool(key: &str, default: bool) -> bool {
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get environment variable as u32 with default
    pub fn get_u32(key: &str, default: u32) -> u32 {
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get environment variable as u16 with default
    pub fn get_u16(key: &str, default: u16) -> u16 {
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get environment variable as u64 with default
    pub fn get_u64(key: &str, default: u64) -> u64 {
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get environment variable as usize with default
    pub fn get_usize(key: &str, default: usize) -> usize {
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Check if environment variable is set
    pub fn is_set(key: &str) -> bool {
        env::var(key).is_ok()
    }

    /// Get required environment variable
    pub fn get_required(key: &str) -> Result<String, ConfigError> {
        env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
    }
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable is not set
    #[error("Required environment variable {0} is not set")]
    MissingVariable(String),

    /// A configuration value is present but unusable
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Execution mode of the service
///
/// Development mode surfaces generated OTP codes and internal error detail to
/// the caller. Production mode never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    #[default]
    Production,
    Development,
}

impl ExecutionMode {
    /// Whether secrets and internal error detail may be returned to callers
    pub fn is_development(self) -> bool {
        matches!(self, ExecutionMode::Development)
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Production => write!(f, "production"),
            ExecutionMode::Development => write!(f, "development"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(ExecutionMode::Production),
            "development" | "dev" => Ok(ExecutionMode::Development),
            other => Err(ConfigError::invalid(
                "EXECUTION_MODE",
                format!("expected production or development, got '{}'", other),
            )),
        }
    }
}

/// Settings for the OTP and OAuth flows
#[derive(Debug, Clone)]
pub struct AuthFlowConfig {
    /// Gates exposure of generated codes and internal error detail
    pub execution_mode: ExecutionMode,
    /// OAuth redirect URI, must match the one registered with the provider
    pub redirect_uri: String,
    /// Client application that receives the OAuth callback redirect
    pub frontend_url: String,
    /// Lifetime of an OTP record
    pub otp_ttl_seconds: u64,
    /// Verification tries allowed per OTP record
    pub otp_max_attempts: u32,
    /// Number of digits in an OTP code
    pub otp_code_length: usize,
    /// Lifetime of an OAuth state token
    pub state_ttl_seconds: u64,
    /// Upper bound for each identity-provider HTTP call
    pub provider_timeout_seconds: u64,
}

impl Default for AuthFlowConfig {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionMode::Production,
            redirect_uri: "http://localhost:8000/api/auth/google/callback/".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            otp_ttl_seconds: 600,
            otp_max_attempts: 3,
            otp_code_length: 6,
            state_ttl_seconds: 900,
            provider_timeout_seconds: 10,
        }
    }
}

impl AuthFlowConfig {
    /// Default settings in development mode
    pub fn development() -> Self {
        Self {
            execution_mode: ExecutionMode::Development,
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            execution_mode: env::get_string("EXECUTION_MODE", "production").parse()?,
            redirect_uri: env::get_string("GOOGLE_REDIRECT_URI", &defaults.redirect_uri),
            frontend_url: env::get_string("FRONTEND_URL", &defaults.frontend_url),
            otp_ttl_seconds: env::get_u64("OTP_TTL_SECONDS", defaults.otp_ttl_seconds),
            otp_max_attempts: env::get_u32("OTP_MAX_ATTEMPTS", defaults.otp_max_attempts),
            otp_code_length: env::get_usize("OTP_CODE_LENGTH", defaults.otp_code_length),
            state_ttl_seconds: env::get_u64("OAUTH_STATE_TTL_SECONDS", defaults.state_ttl_seconds),
            provider_timeout_seconds: env::get_u64(
                "OAUTH_PROVIDER_TIMEOUT_SECONDS",
                defaults.provider_timeout_seconds,
            ),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.otp_ttl_seconds == 0 {
            return Err(ConfigError::invalid("OTP_TTL_SECONDS", "must be greater than 0"));
        }
        if self.otp_max_attempts == 0 {
            return Err(ConfigError::invalid("OTP_MAX_ATTEMPTS", "must be greater than 0"));
        }
        if !(MIN_OTP_DIGITS..=MAX_OTP_DIGITS).contains(&self.otp_code_length) {
            return Err(ConfigError::invalid(
                "OTP_CODE_LENGTH",
                format!("must be between {} and {}", MIN_OTP_DIGITS, MAX_OTP_DIGITS),
            ));
        }
        if self.state_ttl_seconds == 0 {
            return Err(ConfigError::invalid(
                "OAUTH_STATE_TTL_SECONDS",
                "must be greater than 0",
            ));
        }
        if self.provider_timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "OAUTH_PROVIDER_TIMEOUT_SECONDS",
                "must be greater than 0",
            ));
        }
        url::Url::parse(&self.redirect_uri)
            .map_err(|e| ConfigError::invalid("GOOGLE_REDIRECT_URI", e.to_string()))?;
        url::Url::parse(&self.frontend_url)
            .map_err(|e| ConfigError::invalid("FRONTEND_URL", e.to_string()))?;
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    /// Interval of the optional ephemeral-store sweep; 0 disables it
    pub store_sweep_interval_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: env::get_string("SERVER_HOST", "0.0.0.0"),
            port: env::get_u16("SERVER_PORT", 8000),
            cors_origins: env::get_string("CORS_ORIGINS", "*")
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            store_sweep_interval_seconds: env::get_u64("STORE_SWEEP_INTERVAL_SECONDS", 300),
        }
    }
}

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_token_expires_seconds: i64,
    pub refresh_token_expires_seconds: i64,
    pub issuer: String,
}

impl JwtConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            access_secret: env::get_required("JWT_ACCESS_SECRET")?,
            refresh_secret: env::get_required("JWT_REFRESH_SECRET")?,
            access_token_expires_seconds: env::get_u64("JWT_ACCESS_EXPIRES_SECONDS", 3600) as i64,
            refresh_token_expires_seconds: env::get_u64(
                "JWT_REFRESH_EXPIRES_SECONDS",
                7 * 24 * 3600,
            ) as i64,
            issuer: env::get_string("JWT_ISSUER", "identity-service"),
        })
    }
}

/// Email service configuration
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_name: String,
    pub from_email: String,
}

impl EmailConfig {
    /// Returns `Ok(None)` when SMTP is not configured at all
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        if !env::is_set("SMTP_HOST") {
            return Ok(None);
        }

        Ok(Some(Self {
            smtp_host: env::get_required("SMTP_HOST")?,
            smtp_port: env::get_u16("SMTP_PORT", 587),
            smtp_username: env::get_required("SMTP_USERNAME")?,
            smtp_password: env::get_required("SMTP_PASSWORD")?,
            from_name: env::get_string("SMTP_FROM_NAME", "Identity Service"),
            from_email: env::get_required("SMTP_FROM_EMAIL")?,
        }))
    }
}

/// Google OAuth client credentials and endpoints
#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

impl GoogleOAuthConfig {
    pub const AUTH_URL: &'static str = "https://accounts.google.com/o/oauth2/v2/auth";
    pub const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";
    pub const USERINFO_URL: &'static str = "https://www.googleapis.com/oauth2/v2/userinfo";

    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_url: Self::AUTH_URL.to_string(),
            token_url: Self::TOKEN_URL.to_string(),
            userinfo_url: Self::USERINFO_URL.to_string(),
        }
    }

    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        if !env::is_set("GOOGLE_CLIENT_ID") {
            return Ok(None);
        }

        Ok(Some(Self {
            client_id: env::get_required("GOOGLE_CLIENT_ID")?,
            client_secret: env::get_required("GOOGLE_CLIENT_SECRET")?,
            auth_url: env::get_string("GOOGLE_AUTH_URL", Self::AUTH_URL),
            token_url: env::get_string("GOOGLE_TOKEN_URL", Self::TOKEN_URL),
            userinfo_url: env::get_string("GOOGLE_USERINFO_URL", Self::USERINFO_URL),
        }))
    }
}

/// Application configuration combining all service configurations
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Durable storage; in-memory backends are used when absent
    pub database: Option<DatabaseConfig>,

    /// JWT configuration
    pub jwt: JwtConfig,

    /// OTP and OAuth flow settings
    pub auth: AuthFlowConfig,

    /// SMTP configuration; emails are only logged when absent
    pub email: Option<EmailConfig>,

    /// Google OAuth configuration; federated login is disabled when absent
    pub google: Option<GoogleOAuthConfig>,
}

impl AppConfig {
    /// Load complete application configuration from environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let database = if env::is_set("DATABASE_URL") {
            Some(DatabaseConfig::from_env()?)
        } else {
            None
        };

        Ok(Self {
            server: ServerConfig::default(),
            database,
            jwt: JwtConfig::from_env()?,
            auth: AuthFlowConfig::from_env()?,
            email: EmailConfig::from_env()?,
            google: GoogleOAuthConfig::from_env()?,
        })
    }

    /// Validate the complete configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::invalid("SERVER_PORT", "must be greater than 0"));
        }

        if let Some(database) = &self.database {
            if database.max_connections == 0 {
                return Err(ConfigError::invalid(
                    "DB_MAX_CONNECTIONS",
                    "must be greater than 0",
                ));
            }
            if database.min_connections > database.max_connections {
                return Err(ConfigError::invalid(
                    "DB_MIN_CONNECTIONS",
                    "cannot be greater than DB_MAX_CONNECTIONS",
                ));
            }
        }

        if self.jwt.access_secret.len() < 32 {
            return Err(ConfigError::invalid(
                "JWT_ACCESS_SECRET",
                "must be at least 32 bytes",
            ));
        }
        if self.jwt.refresh_secret.len() < 32 {
            return Err(ConfigError::invalid(
                "JWT_REFRESH_SECRET",
                "must be at least 32 bytes",
            ));
        }
        if self.jwt.access_secret == self.jwt.refresh_secret {
            return Err(ConfigError::invalid(
                "JWT_REFRESH_SECRET",
                "access and refresh secrets must be different",
            ));
        }

        self.auth.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_app_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
                cors_origins: vec!["*".to_string()],
                store_sweep_interval_seconds: 0,
            },
            database: None,
            jwt: JwtConfig {
                access_secret: "a".repeat(32),
                refresh_secret: "b".repeat(32),
                access_token_expires_seconds: 3600,
                refresh_token_expires_seconds: 604800,
                issuer: "identity-service".to_string(),
            },
            auth: AuthFlowConfig::default(),
            email: None,
            google: None,
        }
    }

    #[test]
    fn test_auth_flow_defaults() {
        let config = AuthFlowConfig::default();
        assert_eq!(config.execution_mode, ExecutionMode::Production);
        assert_eq!(config.otp_ttl_seconds, 600);
        assert_eq!(config.otp_max_attempts, 3);
        assert_eq!(config.otp_code_length, 6);
        assert_eq!(config.state_ttl_seconds, 900);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_execution_mode_parsing() {
        assert_eq!(
            "production".parse::<ExecutionMode>().unwrap(),
            ExecutionMode::Production
        );
        assert_eq!(
            "DEV".parse::<ExecutionMode>().unwrap(),
            ExecutionMode::Development
        );
        assert!("staging".parse::<ExecutionMode>().is_err());
        assert!(ExecutionMode::Development.is_development());
        assert!(!ExecutionMode::Production.is_development());
    }

    #[test]
    fn test_auth_flow_validation() {
        let mut config = AuthFlowConfig::development();
        config.otp_max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = AuthFlowConfig::default();
        config.redirect_uri = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = AuthFlowConfig::default();
        config.otp_code_length = 2;
        assert!(config.validate().is_err());

        config.otp_code_length = 8;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_app_config_validation() {
        assert!(test_app_config().validate().is_ok());

        let mut config = test_app_config();
        config.jwt.access_secret = "short".to_string();
        assert!(config.validate().is_err());

        let mut config = test_app_config();
        config.jwt.refresh_secret = config.jwt.access_secret.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_helpers() {
        assert!(env::get_bool("IDENTITY_SERVICE_NONEXISTENT_BOOL", true));
        assert_eq!(env::get_u32("IDENTITY_SERVICE_NONEXISTENT_U32", 42), 42);
        assert_eq!(
            env::get_string("IDENTITY_SERVICE_NONEXISTENT_STRING", "default"),
            "default"
        );
        assert!(env::get_required("IDENTITY_SERVICE_NONEXISTENT_REQUIRED").is_err());
    }
}
