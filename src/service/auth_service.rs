//! Authentication Service
//!
//! Email-based sign-in flows built on the OTP lifecycle: passwordless
//! sign-in, OTP-gated password registration and password sign-in.

use std::sync::Arc;

use log::{info, warn};

use crate::models::auth::SignIn;
use crate::models::otp::{OtpDispatch, PendingRegistration};
use crate::service::identity::IdentityReconciler;
use crate::service::jwt::CredentialIssuer;
use crate::service::otp_service::OtpService;
use crate::utils::error::{AppError, AppResult};
use crate::utils::security::{hash_password_with_cost, DEFAULT_BCRYPT_COST};
use crate::utils::validation::normalize_email;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

pub struct AuthService {
    otp: Arc<OtpService>,
    reconciler: Arc<IdentityReconciler>,
    issuer: Arc<dyn CredentialIssuer>,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(
        otp: Arc<OtpService>,
        reconciler: Arc<IdentityReconciler>,
        issuer: Arc<dyn CredentialIssuer>,
    ) -> Self {
        Self {
            otp,
            reconciler,
            issuer,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
        }
    }

    /// Override the bcrypt cost used for registration passwords
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    pub fn otp(&self) -> &OtpService {
        &self.otp
    }

    /// Send a passwordless sign-in code
    pub async fn send_otp(
        &self,
        email: &str,
        first_name: Option<String>,
        last_name: Option<String>,
    ) -> AppResult<OtpDispatch> {
        let pending = (first_name.is_some() || last_name.is_some())
            .then(|| PendingRegistration::names(first_name, last_name));

        Ok(self.otp.request_otp(email, pending).await?)
    }

    pub async fn resend_otp(&self, email: &str) -> AppResult<OtpDispatch> {
        Ok(self.otp.resend_otp(email).await?)
    }

    /// Start a password registration; the account is created once the
    /// emailed code is verified
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        first_name: Option<String>,
        last_name: Option<String>,
    ) -> AppResult<OtpDispatch> {
        let normalized = normalize_email(email);
        if self
            .reconciler
            .directory()
            .find_by_email(&normalized)
            .await?
            .is_some()
        {
            return Err(AppError::BadRequest(
                "User with this email already exists".to_string(),
            ));
        }

        let pending = PendingRegistration {
            password_hash: Some(hash_password_with_cost(password, self.bcrypt_cost)?),
            first_name,
            last_name,
        };

        info!("Registration started for {}", normalized);
        Ok(self.otp.request_otp(&normalized, Some(pending)).await?)
    }

    /// Verify a code, reconcile the identity and issue tokens
    pub async fn verify_and_sign_in(
        &self,
        email: &str,
        code: &str,
        first_name: Option<String>,
        last_name: Option<String>,
    ) -> AppResult<SignIn> {
        let verified = self.otp.verify_otp(email, code).await?;

        let reconciled = self
            .reconciler
            .reconcile_by_email_otp(
                &verified.email,
                verified.pending_registration,
                first_name,
                last_name,
            )
            .await?;

        let tokens = self.issuer.issue(&reconciled.user).await?;

        Ok(SignIn {
            user: reconciled.user,
            tokens,
            is_new_user: reconciled.created,
        })
    }

    /// Password sign-in; unknown emails and wrong passwords fail alike
    pub async fn login_with_password(&self, email: &str, password: &str) -> AppResult<SignIn> {
        let normalized = normalize_email(email);
        let directory = self.reconciler.directory();

        let user = match directory.find_by_email(&normalized).await? {
            Some(user) => user,
            None => return Err(AppError::Authentication(INVALID_CREDENTIALS.to_string())),
        };

        if !directory.check_credential(user.id, password).await? {
            warn!("Failed password sign-in for {}", normalized);
            return Err(AppError::Authentication(INVALID_CREDENTIALS.to_string()));
        }

        let tokens = self.issuer.issue(&user).await?;
        info!("Password sign-in for {}", user.id);

        Ok(SignIn {
            user,
            tokens,
            is_new_user: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthFlowConfig, JwtConfig};
    use crate::service::directory::InMemoryUserDirectory;
    use crate::service::email_service::LogEmailGateway;
    use crate::service::jwt::JwtService;
    use crate::store::MemoryStore;
    use crate::utils::security::SecretGenerator;

    struct FixedSecrets;

    impl SecretGenerator for FixedSecrets {
        fn otp_code(&self, _digits: usize) -> String {
            "123456".to_string()
        }

        fn state_token(&self) -> String {
            "state".to_string()
        }
    }

    fn auth_service() -> AuthService {
        let store = Arc::new(MemoryStore::new());
        let otp = Arc::new(OtpService::new(
            store.clone(),
            Arc::new(LogEmailGateway),
            Arc::new(FixedSecrets),
            AuthFlowConfig::default(),
        ));
        let jwt = JwtService::new(
            store,
            &JwtConfig {
                access_secret: "a".repeat(32),
                refresh_secret: "b".repeat(32),
                access_token_expires_seconds: 3600,
                refresh_token_expires_seconds: 604800,
                issuer: "identity-service".to_string(),
            },
        );
        let reconciler = Arc::new(IdentityReconciler::new(Arc::new(
            InMemoryUserDirectory::new(),
        )));
        AuthService::new(otp, reconciler, Arc::new(jwt)).with_bcrypt_cost(4)
    }

    #[tokio::test]
    async fn test_register_verify_then_password_login() {
        let service = auth_service();
        service
            .register("ada@example.com", "analytical1", Some("Ada".to_string()), None)
            .await
            .unwrap();

        let sign_in = service
            .verify_and_sign_in("ada@example.com", "123456", None, None)
            .await
            .unwrap();
        assert!(sign_in.is_new_user);
        assert!(sign_in.user.has_password);
        assert_eq!(sign_in.user.first_name.as_deref(), Some("Ada"));

        let login = service
            .login_with_password("ADA@example.com", "analytical1")
            .await
            .unwrap();
        assert_eq!(login.user.id, sign_in.user.id);
    }

    #[tokio::test]
    async fn test_register_existing_email_is_rejected() {
        let service = auth_service();
        service.send_otp("ada@example.com", None, None).await.unwrap();
        service
            .verify_and_sign_in("ada@example.com", "123456", None, None)
            .await
            .unwrap();

        let result = service
            .register("ada@example.com", "analytical1", None, None)
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_password_login_failures_are_indistinguishable() {
        let service = auth_service();
        service.send_otp("ada@example.com", None, None).await.unwrap();
        service
            .verify_and_sign_in("ada@example.com", "123456", None, None)
            .await
            .unwrap();

        let no_password = service
            .login_with_password("ada@example.com", "anything1")
            .await
            .unwrap_err();
        let unknown = service
            .login_with_password("nobody@example.com", "anything1")
            .await
            .unwrap_err();

        assert_eq!(no_password.to_string(), unknown.to_string());
    }
}
