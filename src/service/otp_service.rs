//! OTP Service
//!
//! Issues, re-sends and verifies numeric one-time passcodes delivered by
//! email. One authoritative record lives per normalized email; issuing a new
//! code supersedes the old one. Verification counts every try, compares in
//! constant time and consumes the record on success.

use std::sync::Arc;

use log::{debug, info, warn};
use thiserror::Error;

use crate::config::AuthFlowConfig;
use crate::models::otp::{OtpDispatch, OtpRecord, PendingRegistration, VerifiedOtp};
use crate::service::email_service::{compose_otp_email, EmailGateway};
use crate::store::{get_json, keys, put_json, EphemeralStore, StoreError};
use crate::utils::error::AppError;
use crate::utils::security::{constant_time_compare, SecretGenerator};
use crate::utils::validation::{normalize_email, validate_email, validate_otp_format};

/// Read-modify-write attempts before giving up on a contended record
const MAX_CAS_RETRIES: usize = 8;

/// OTP lifecycle errors
#[derive(Error, Debug)]
pub enum OtpServiceError {
    #[error("Invalid email address")]
    InvalidEmail,

    /// Candidate does not have the configured number of digits
    #[error("Verification code must be {expected_digits} digits")]
    MalformedCode { expected_digits: usize },

    /// No record, or the record expired or was already used
    #[error("No active verification code for this email")]
    NotFound,

    #[error("Too many verification attempts, request a new code")]
    TooManyAttempts,

    #[error("Invalid verification code")]
    InvalidCode { remaining_attempts: u32 },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl OtpServiceError {
    /// Stable machine-readable code
    pub fn error_code(&self) -> &'static str {
        match self {
            OtpServiceError::InvalidEmail => "invalid_email",
            OtpServiceError::MalformedCode { .. } => "invalid_format",
            OtpServiceError::NotFound => "otp_not_found",
            OtpServiceError::TooManyAttempts => "too_many_attempts",
            OtpServiceError::InvalidCode { .. } => "invalid_code",
            OtpServiceError::Store(_) => "store_error",
        }
    }
}

impl From<OtpServiceError> for AppError {
    fn from(err: OtpServiceError) -> Self {
        match err {
            OtpServiceError::InvalidEmail | OtpServiceError::MalformedCode { .. } => {
                AppError::Validation(err.to_string())
            }
            OtpServiceError::Store(e) => e.into(),
            OtpServiceError::InvalidCode { remaining_attempts } => AppError::Otp {
                code: "invalid_code",
                message: "Invalid verification code".to_string(),
                remaining_attempts: Some(remaining_attempts),
            },
            other => AppError::Otp {
                code: other.error_code(),
                message: other.to_string(),
                remaining_attempts: None,
            },
        }
    }
}

/// OTP lifecycle manager
pub struct OtpService {
    store: Arc<dyn EphemeralStore>,
    email: Arc<dyn EmailGateway>,
    secrets: Arc<dyn SecretGenerator>,
    config: AuthFlowConfig,
    app_name: String,
}

impl OtpService {
    pub fn new(
        store: Arc<dyn EphemeralStore>,
        email: Arc<dyn EmailGateway>,
        secrets: Arc<dyn SecretGenerator>,
        config: AuthFlowConfig,
    ) -> Self {
        Self {
            store,
            email,
            secrets,
            config,
            app_name: "Identity Service".to_string(),
        }
    }

    /// Brand used in email subjects and bodies
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    pub fn config(&self) -> &AuthFlowConfig {
        &self.config
    }

    /// Issue a fresh code for `email`, superseding any previous one
    ///
    /// Delivery failure does not fail the call: the record stays in place and
    /// `sent` is `false`, so the caller can retry sending.
    pub async fn request_otp(
        &self,
        email: &str,
        pending_registration: Option<PendingRegistration>,
    ) -> Result<OtpDispatch, OtpServiceError> {
        let email = normalize_email(email);
        if !validate_email(&email) {
            return Err(OtpServiceError::InvalidEmail);
        }

        let key = keys::otp(&email);
        if self.store.delete(&key).await? {
            debug!("Superseded previous OTP record for {}", email);
        }

        let code = self.secrets.otp_code(self.config.otp_code_length);
        let record = OtpRecord::new(
            email.clone(),
            code.clone(),
            self.config.otp_ttl_seconds,
            self.config.otp_max_attempts,
            pending_registration,
        );
        put_json(self.store.as_ref(), &key, &record, record.expires_at).await?;

        let sent = self.dispatch(&email, &code).await;
        info!("OTP issued for {} (delivered: {})", email, sent);

        Ok(OtpDispatch {
            sent,
            expires_in: self.config.otp_ttl_seconds as i64,
            debug_code: self.debug_code(code),
        })
    }

    /// Send the current active code again without regenerating it
    pub async fn resend_otp(&self, email: &str) -> Result<OtpDispatch, OtpServiceError> {
        let email = normalize_email(email);
        if !validate_email(&email) {
            return Err(OtpServiceError::InvalidEmail);
        }

        let record = get_json::<OtpRecord>(self.store.as_ref(), &keys::otp(&email))
            .await?
            .map(|versioned| versioned.value)
            .filter(|record| !record.used && !record.is_expired() && !record.is_exhausted())
            .ok_or(OtpServiceError::NotFound)?;

        let sent = self.dispatch(&email, &record.code).await;
        info!("OTP re-sent for {} (delivered: {})", email, sent);

        Ok(OtpDispatch {
            sent,
            expires_in: record.expires_in(),
            debug_code: self.debug_code(record.code),
        })
    }

    /// Check `candidate` against the active code for `email`
    ///
    /// A candidate of the wrong shape is rejected without touching the
    /// record. Every other try against a live record counts, whether or not
    /// it matches. On a match the record is marked used and evicted, and any
    /// registration fields stored with it are handed back.
    pub async fn verify_otp(
        &self,
        email: &str,
        candidate: &str,
    ) -> Result<VerifiedOtp, OtpServiceError> {
        let email = normalize_email(email);
        if !validate_email(&email) {
            return Err(OtpServiceError::InvalidEmail);
        }
        let candidate = candidate.trim();
        if !validate_otp_format(candidate, self.config.otp_code_length) {
            return Err(OtpServiceError::MalformedCode {
                expected_digits: self.config.otp_code_length,
            });
        }
        let key = keys::otp(&email);

        for _ in 0..MAX_CAS_RETRIES {
            let current = get_json::<OtpRecord>(self.store.as_ref(), &key)
                .await?
                .ok_or(OtpServiceError::NotFound)?;
            let record = &current.value;

            if record.used || record.is_expired() {
                return Err(OtpServiceError::NotFound);
            }

            if record.is_exhausted() {
                // A lost race here means someone else already replaced the record
                self.store.compare_and_swap(&key, &current.raw, None).await?;
                warn!("OTP attempts exhausted for {}", email);
                return Err(OtpServiceError::TooManyAttempts);
            }

            let matched = constant_time_compare(&record.code, candidate);
            let mut next = record.clone();
            next.attempts += 1;
            next.used = matched;

            let next_raw = serde_json::to_string(&next).map_err(StoreError::from)?;
            if !self
                .store
                .compare_and_swap(&key, &current.raw, Some(next_raw.clone()))
                .await?
            {
                debug!("OTP record for {} changed concurrently, retrying", email);
                continue;
            }

            if !matched {
                info!(
                    "Invalid OTP for {} ({} attempts left)",
                    email,
                    next.remaining_attempts()
                );
                return Err(OtpServiceError::InvalidCode {
                    remaining_attempts: next.remaining_attempts(),
                });
            }

            // The used flag is already durable; eviction is cleanup
            if let Err(e) = self.store.compare_and_swap(&key, &next_raw, None).await {
                warn!("Failed to evict used OTP record for {}: {}", email, e);
            }
            info!("OTP verified for {}", email);

            return Ok(VerifiedOtp {
                email,
                pending_registration: next.pending_registration,
            });
        }

        Err(OtpServiceError::Store(StoreError::Contention(key)))
    }

    async fn dispatch(&self, email: &str, code: &str) -> bool {
        let (subject, body) =
            compose_otp_email(&self.app_name, code, self.config.otp_ttl_seconds);
        let sent = self.email.send(email, &subject, &body).await;
        if !sent {
            warn!("OTP email to {} was not delivered; the code remains valid", email);
        }
        sent
    }

    fn debug_code(&self, code: String) -> Option<String> {
        self.config.execution_mode.is_development().then_some(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct FixedSecrets(&'static str);

    impl SecretGenerator for FixedSecrets {
        fn otp_code(&self, _digits: usize) -> String {
            self.0.to_string()
        }

        fn state_token(&self) -> String {
            "fixed-state".to_string()
        }
    }

    #[derive(Default)]
    struct RecordingGateway {
        fail: AtomicBool,
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl EmailGateway for RecordingGateway {
        async fn send(&self, to: &str, _subject: &str, body: &str) -> bool {
            if self.fail.load(Ordering::SeqCst) {
                return false;
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), body.to_string()));
            true
        }
    }

    fn service_with(
        code: &'static str,
        config: AuthFlowConfig,
    ) -> (OtpService, Arc<MemoryStore>, Arc<RecordingGateway>) {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(RecordingGateway::default());
        let service = OtpService::new(
            store.clone(),
            gateway.clone(),
            Arc::new(FixedSecrets(code)),
            config,
        );
        (service, store, gateway)
    }

    #[tokio::test]
    async fn test_request_normalizes_email_and_sends_code() {
        let (service, store, gateway) = service_with("123456", AuthFlowConfig::default());

        let dispatch = service.request_otp("  User@Example.COM ", None).await.unwrap();

        assert!(dispatch.sent);
        assert_eq!(dispatch.expires_in, 600);
        assert!(dispatch.debug_code.is_none());

        let sent = gateway.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "user@example.com");
        assert!(sent[0].1.contains("123456"));

        let record = get_json::<OtpRecord>(store.as_ref(), "otp:user@example.com")
            .await
            .unwrap()
            .unwrap()
            .value;
        assert_eq!(record.attempts, 0);
        assert_eq!(record.max_attempts, 3);
        assert!(!record.used);
    }

    #[tokio::test]
    async fn test_invalid_email_has_no_side_effects() {
        let (service, store, gateway) = service_with("123456", AuthFlowConfig::default());

        let result = service.request_otp("not-an-email", None).await;

        assert!(matches!(result, Err(OtpServiceError::InvalidEmail)));
        assert!(store.is_empty());
        assert!(gateway.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_debug_code_only_in_development() {
        let (service, _, _) = service_with("654321", AuthFlowConfig::development());
        let dispatch = service.request_otp("dev@example.com", None).await.unwrap();
        assert_eq!(dispatch.debug_code.as_deref(), Some("654321"));
    }

    #[tokio::test]
    async fn test_failed_delivery_keeps_record() {
        let (service, _, gateway) = service_with("123456", AuthFlowConfig::default());
        gateway.fail.store(true, Ordering::SeqCst);

        let dispatch = service.request_otp("user@example.com", None).await.unwrap();
        assert!(!dispatch.sent);

        gateway.fail.store(false, Ordering::SeqCst);
        let resent = service.resend_otp("user@example.com").await.unwrap();
        assert!(resent.sent);
        assert!(gateway.sent.lock().unwrap()[0].1.contains("123456"));

        assert!(service.verify_otp("user@example.com", "123456").await.is_ok());
    }

    #[tokio::test]
    async fn test_verify_success_consumes_record() {
        let (service, store, _) = service_with("123456", AuthFlowConfig::default());
        service.request_otp("user@example.com", None).await.unwrap();

        let verified = service.verify_otp("USER@example.com", "123456").await.unwrap();
        assert_eq!(verified.email, "user@example.com");
        assert!(store.get("otp:user@example.com").await.unwrap().is_none());

        let again = service.verify_otp("user@example.com", "123456").await;
        assert!(matches!(again, Err(OtpServiceError::NotFound)));
    }

    #[tokio::test]
    async fn test_wrong_codes_count_down_then_lock_out() {
        let (service, _, _) = service_with("123456", AuthFlowConfig::default());
        service.request_otp("user@example.com", None).await.unwrap();

        for expected_remaining in [2, 1, 0] {
            match service.verify_otp("user@example.com", "000000").await {
                Err(OtpServiceError::InvalidCode { remaining_attempts }) => {
                    assert_eq!(remaining_attempts, expected_remaining)
                }
                other => panic!("unexpected outcome: {:?}", other.map(|v| v.email)),
            }
        }

        // Even the correct code is refused once attempts are spent
        let locked = service.verify_otp("user@example.com", "123456").await;
        assert!(matches!(locked, Err(OtpServiceError::TooManyAttempts)));
    }

    #[tokio::test]
    async fn test_correct_code_on_last_attempt_succeeds() {
        let (service, _, _) = service_with("123456", AuthFlowConfig::default());
        service.request_otp("user@example.com", None).await.unwrap();

        for _ in 0..2 {
            assert!(service.verify_otp("user@example.com", "999999").await.is_err());
        }
        assert!(service.verify_otp("user@example.com", "123456").await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_record_is_not_found() {
        let (service, store, _) = service_with("123456", AuthFlowConfig::default());
        service.request_otp("user@example.com", None).await.unwrap();

        let key = "otp:user@example.com";
        let current = get_json::<OtpRecord>(store.as_ref(), key)
            .await
            .unwrap()
            .unwrap();
        let mut expired = current.value.clone();
        expired.expires_at = chrono::Utc::now() - chrono::Duration::seconds(1);
        assert!(crate::store::swap_json(store.as_ref(), key, &current, &expired)
            .await
            .unwrap());

        let result = service.verify_otp("user@example.com", "123456").await;
        assert!(matches!(result, Err(OtpServiceError::NotFound)));
        assert!(matches!(
            service.resend_otp("user@example.com").await,
            Err(OtpServiceError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_verify_without_record() {
        let (service, _, _) = service_with("123456", AuthFlowConfig::default());
        let result = service.verify_otp("nobody@example.com", "123456").await;
        assert!(matches!(result, Err(OtpServiceError::NotFound)));
    }

    #[tokio::test]
    async fn test_pending_registration_is_returned() {
        let (service, _, _) = service_with("123456", AuthFlowConfig::default());
        let pending = PendingRegistration {
            password_hash: Some("$2b$04$hash".to_string()),
            first_name: Some("Ada".to_string()),
            last_name: None,
        };
        service
            .request_otp("user@example.com", Some(pending.clone()))
            .await
            .unwrap();

        let verified = service.verify_otp("user@example.com", "123456").await.unwrap();
        assert_eq!(verified.pending_registration, Some(pending));
    }

    #[tokio::test]
    async fn test_configured_code_length_is_issued_and_verified() {
        let config = AuthFlowConfig {
            otp_code_length: 8,
            ..AuthFlowConfig::default()
        };
        let (service, store, _) = service_with("12345678", config);
        service.request_otp("user@example.com", None).await.unwrap();

        // A six-digit guess cannot match an eight-digit code and costs no attempt
        let short = service.verify_otp("user@example.com", "123456").await;
        assert!(matches!(
            short,
            Err(OtpServiceError::MalformedCode { expected_digits: 8 })
        ));
        let record = get_json::<OtpRecord>(store.as_ref(), "otp:user@example.com")
            .await
            .unwrap()
            .unwrap()
            .value;
        assert_eq!(record.attempts, 0);

        let verified = service.verify_otp("user@example.com", " 12345678 ").await.unwrap();
        assert_eq!(verified.email, "user@example.com");
    }

    #[tokio::test]
    async fn test_malformed_code_maps_to_validation_error() {
        let (service, _, _) = service_with("123456", AuthFlowConfig::default());
        service.request_otp("user@example.com", None).await.unwrap();

        let err = service.verify_otp("user@example.com", "12a456").await.unwrap_err();
        assert_eq!(err.error_code(), "invalid_format");
        assert!(matches!(AppError::from(err), AppError::Validation(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_correct_codes_succeed_once() {
        let (service, _, _) = service_with("123456", AuthFlowConfig::default());
        let service = Arc::new(service);
        service.request_otp("user@example.com", None).await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.verify_otp("user@example.com", "123456").await })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(OtpServiceError::NotFound) => {}
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_wrong_codes_respect_attempt_limit() {
        let config = AuthFlowConfig::default();
        let max_attempts = config.otp_max_attempts;
        let (service, _, _) = service_with("123456", config);
        let service = Arc::new(service);
        service.request_otp("user@example.com", None).await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.verify_otp("user@example.com", "000000").await })
            })
            .collect();

        let mut invalid = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Err(OtpServiceError::InvalidCode { .. }) => invalid += 1,
                Err(OtpServiceError::TooManyAttempts) | Err(OtpServiceError::NotFound) => {}
                other => panic!("unexpected outcome: {:?}", other.map(|v| v.email)),
            }
        }
        assert_eq!(invalid, max_attempts);

        // The record is spent; the right code no longer works
        let after = service.verify_otp("user@example.com", "123456").await;
        assert!(matches!(
            after,
            Err(OtpServiceError::TooManyAttempts) | Err(OtpServiceError::NotFound)
        ));
    }
}
