//! OTP Models
//!
//! Records and results for the one-time passcode lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Registration details captured when a sign-up is gated behind an OTP
///
/// Only the bcrypt hash of the password is ever stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRegistration {
    pub password_hash: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl PendingRegistration {
    /// Names only, for passwordless sign-up
    pub fn names(first_name: Option<String>, last_name: Option<String>) -> Self {
        Self {
            password_hash: None,
            first_name,
            last_name,
        }
    }
}

/// Stored OTP record, one authoritative record per email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpRecord {
    /// Distinguishes a record from the one it superseded
    pub id: Uuid,

    /// Normalized email the code was sent to
    pub email: String,

    /// Numeric code, compared in constant time
    pub code: String,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,

    /// Verification tries made so far, successful or not
    pub attempts: u32,
    pub max_attempts: u32,

    /// Terminal once set
    pub used: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_registration: Option<PendingRegistration>,
}

impl OtpRecord {
    pub fn new(
        email: String,
        code: String,
        ttl_seconds: u64,
        max_attempts: u32,
        pending_registration: Option<PendingRegistration>,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            code,
            created_at,
            expires_at: created_at + chrono::Duration::seconds(ttl_seconds as i64),
            attempts: 0,
            max_attempts,
            used: false,
            pending_registration,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Whether every allowed verification try has been spent
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Tries left before the record becomes void
    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }

    /// Seconds until expiry, never negative
    pub fn expires_in(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }
}

/// Outcome of issuing (or re-sending) a code
#[derive(Debug, Clone, Serialize)]
pub struct OtpDispatch {
    /// Whether the email gateway accepted the message
    pub sent: bool,

    /// Seconds until the code expires
    pub expires_in: i64,

    /// The generated code, populated in development mode only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_code: Option<String>,
}

/// Successful verification of a code
#[derive(Debug, Clone)]
pub struct VerifiedOtp {
    pub email: String,
    pub pending_registration: Option<PendingRegistration>,
}

/// Externally visible verification result
///
/// Failed verifications carry this as the `details` of the error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyResult {
    pub ok: bool,

    /// Stable failure code, absent on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_attempts: Option<u32>,
}

impl VerifyResult {
    pub fn failure(reason: &str, remaining_attempts: Option<u32>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.to_string()),
            remaining_attempts,
        }
    }
}
