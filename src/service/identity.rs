//! Identity Reconciler
//!
//! Maps a verified email or a federated identity onto exactly one local user,
//! creating it on first sight and filling in missing details afterwards.

use std::sync::Arc;

use log::{info, warn};
use thiserror::Error;

use crate::models::otp::PendingRegistration;
use crate::models::user::{IdentityPatch, NewIdentity, RegistrationMethod, UserIdentity};
use crate::service::directory::{DirectoryError, UserDirectory};
use crate::utils::error::AppError;
use crate::utils::validation::{normalize_email, validate_email};

/// Uniqueness conflicts tolerated before giving up
const MAX_CONFLICT_RETRIES: usize = 3;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidEmail => AppError::Validation(err.to_string()),
            IdentityError::Directory(e) => e.into(),
        }
    }
}

/// Outcome of reconciliation
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub user: UserIdentity,
    pub created: bool,
}

pub struct IdentityReconciler {
    directory: Arc<dyn UserDirectory>,
}

impl IdentityReconciler {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }

    pub fn directory(&self) -> &Arc<dyn UserDirectory> {
        &self.directory
    }

    /// Reconcile an email proven by OTP
    ///
    /// Names from a pending registration win over the ones passed in. A
    /// pending password hash is only used when the identity is created.
    pub async fn reconcile_by_email_otp(
        &self,
        email: &str,
        pending: Option<PendingRegistration>,
        first_name: Option<String>,
        last_name: Option<String>,
    ) -> Result<Reconciled, IdentityError> {
        let email = normalize_email(email);
        if !validate_email(&email) {
            return Err(IdentityError::InvalidEmail);
        }

        let pending = pending.unwrap_or(PendingRegistration {
            password_hash: None,
            first_name: None,
            last_name: None,
        });
        let first_name = clean(pending.first_name).or_else(|| clean(first_name));
        let last_name = clean(pending.last_name).or_else(|| clean(last_name));

        let defaults = NewIdentity {
            email: email.clone(),
            federated_id: None,
            email_verified: true,
            registration_method: RegistrationMethod::EmailOtp,
            first_name: first_name.clone(),
            last_name: last_name.clone(),
            password_hash: pending.password_hash,
        };
        let patch = IdentityPatch {
            mark_email_verified: true,
            first_name,
            last_name,
            federated_id: None,
        };

        let reconciled = self.get_or_create(defaults, patch).await?;
        if reconciled.created {
            info!("Created identity {} via email OTP", reconciled.user.id);
        }
        Ok(reconciled)
    }

    /// Reconcile a federated identity
    ///
    /// A known federated id wins. Otherwise the identity with the same email
    /// is linked, or a new one is created.
    pub async fn reconcile_by_federated_id(
        &self,
        federated_id: &str,
        email: &str,
        first_name: Option<String>,
        last_name: Option<String>,
    ) -> Result<Reconciled, IdentityError> {
        let email = normalize_email(email);
        if !validate_email(&email) {
            return Err(IdentityError::InvalidEmail);
        }

        if let Some(user) = self.directory.find_by_federated_id(federated_id).await? {
            return Ok(Reconciled {
                user,
                created: false,
            });
        }

        let first_name = clean(first_name);
        let last_name = clean(last_name);
        let defaults = NewIdentity {
            email: email.clone(),
            federated_id: Some(federated_id.to_string()),
            email_verified: true,
            registration_method: RegistrationMethod::GoogleOauth,
            first_name: first_name.clone(),
            last_name: last_name.clone(),
            password_hash: None,
        };
        let patch = IdentityPatch {
            mark_email_verified: true,
            first_name,
            last_name,
            federated_id: Some(federated_id.to_string()),
        };

        let mut attempt = 0;
        let reconciled = loop {
            match self.directory.get_or_create(defaults.clone(), patch.clone()).await {
                Ok((user, created)) => break Reconciled { user, created },
                Err(DirectoryError::Conflict(reason)) if attempt < MAX_CONFLICT_RETRIES => {
                    attempt += 1;
                    warn!("Identity conflict while linking federated login: {}", reason);
                    // A concurrent callback may have linked this federated id first
                    if let Some(user) = self.directory.find_by_federated_id(federated_id).await? {
                        break Reconciled {
                            user,
                            created: false,
                        };
                    }
                }
                Err(e) => return Err(e.into()),
            }
        };

        if reconciled.user.federated_id.as_deref() != Some(federated_id) {
            warn!(
                "Identity {} is linked to a different federated account; signing in by email",
                reconciled.user.id
            );
        } else if reconciled.created {
            info!("Created identity {} via federated login", reconciled.user.id);
        } else {
            info!("Linked federated login to identity {}", reconciled.user.id);
        }

        Ok(reconciled)
    }

    async fn get_or_create(
        &self,
        defaults: NewIdentity,
        patch: IdentityPatch,
    ) -> Result<Reconciled, IdentityError> {
        let mut attempt = 0;
        loop {
            match self.directory.get_or_create(defaults.clone(), patch.clone()).await {
                Ok((user, created)) => return Ok(Reconciled { user, created }),
                Err(DirectoryError::Conflict(reason)) if attempt < MAX_CONFLICT_RETRIES => {
                    attempt += 1;
                    warn!("Identity conflict for {}, retrying: {}", defaults.email, reason);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn clean(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}
