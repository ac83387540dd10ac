//! User Model
//!
//! Identity records owned by the user directory.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How an identity first came into existence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationMethod {
    EmailOtp,
    GoogleOauth,
    Admin,
}

impl RegistrationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationMethod::EmailOtp => "email_otp",
            RegistrationMethod::GoogleOauth => "google_oauth",
            RegistrationMethod::Admin => "admin",
        }
    }
}

impl fmt::Display for RegistrationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistrationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email_otp" => Ok(RegistrationMethod::EmailOtp),
            "google_oauth" => Ok(RegistrationMethod::GoogleOauth),
            "admin" => Ok(RegistrationMethod::Admin),
            other => Err(format!("Unknown registration method: {}", other)),
        }
    }
}

/// User identity for service and API consumers
///
/// The password hash never leaves the directory; `has_password` tells
/// whether password sign-in is possible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: Uuid,

    /// Unique, normalized email
    pub email: String,

    /// Subject id at the federated provider, unique when present
    pub federated_id: Option<String>,

    pub email_verified: bool,
    pub registration_method: RegistrationMethod,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub has_password: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database row including the password hash
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub federated_id: Option<String>,
    pub email_verified: bool,
    pub registration_method: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserIdentity {
    type Error = String;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(UserIdentity {
            id: row.id,
            email: row.email,
            federated_id: row.federated_id,
            email_verified: row.email_verified,
            registration_method: row.registration_method.parse()?,
            first_name: row.first_name,
            last_name: row.last_name,
            has_password: row.password_hash.is_some(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Field values used when `get_or_create` has to create the identity
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub email: String,
    pub federated_id: Option<String>,
    pub email_verified: bool,
    pub registration_method: RegistrationMethod,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Only ever applied on creation
    pub password_hash: Option<String>,
}

/// Non-destructive update applied when `get_or_create` finds an identity
///
/// Names and the federated id only fill gaps; existing values are kept.
#[derive(Debug, Clone, Default)]
pub struct IdentityPatch {
    pub mark_email_verified: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub federated_id: Option<String>,
}

impl IdentityPatch {
    /// Apply the patch in place, returning whether anything changed
    pub fn apply(&self, identity: &mut UserIdentity) -> bool {
        let mut changed = false;

        if self.mark_email_verified && !identity.email_verified {
            identity.email_verified = true;
            changed = true;
        }

        changed |= fill_if_missing(&mut identity.first_name, &self.first_name);
        changed |= fill_if_missing(&mut identity.last_name, &self.last_name);
        // A stored federated id is kept even when blank
        if identity.federated_id.is_none() {
            if let Some(id) = self.federated_id.as_deref().filter(|id| !id.trim().is_empty()) {
                identity.federated_id = Some(id.to_string());
                changed = true;
            }
        }

        if changed {
            identity.updated_at = Utc::now();
        }
        changed
    }
}

fn fill_if_missing(slot: &mut Option<String>, value: &Option<String>) -> bool {
    let missing = slot.as_deref().map_or(true, |s| s.trim().is_empty());
    match value {
        Some(v) if missing && !v.trim().is_empty() => {
            *slot = Some(v.clone());
            true
        }
        _ => false,
    }
}
