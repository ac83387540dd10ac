//! User Directory
//!
//! Storage of user identities. The [`UserDirectory`] trait is the only way
//! the rest of the service touches identities; `get_or_create` is atomic in
//! every implementation and the directory enforces unique emails and unique
//! federated ids.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::user::{IdentityPatch, NewIdentity, UserIdentity, UserRow};
use crate::utils::error::AppError;
use crate::utils::security::verify_password;

/// Directory errors
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// A uniqueness constraint was hit by a concurrent writer
    #[error("Conflicting identity: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Password hashing error: {0}")]
    Hashing(#[from] bcrypt::BcryptError),

    #[error("Stored identity is invalid: {0}")]
    Corrupt(String),

    #[error("Directory unavailable: {0}")]
    Unavailable(String),
}

impl From<DirectoryError> for AppError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Database(e) => AppError::Database(e),
            DirectoryError::Hashing(e) => AppError::HashingError(e),
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// Identity storage contract
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserIdentity>, DirectoryError>;

    async fn find_by_federated_id(
        &self,
        federated_id: &str,
    ) -> Result<Option<UserIdentity>, DirectoryError>;

    /// Atomically fetch the identity for `defaults.email`, applying `patch`,
    /// or create it from `defaults`. Returns the identity and whether it was
    /// created.
    async fn get_or_create(
        &self,
        defaults: NewIdentity,
        patch: IdentityPatch,
    ) -> Result<(UserIdentity, bool), DirectoryError>;

    /// Check a password against the stored hash; `false` when none is set
    async fn check_credential(&self, user_id: Uuid, secret: &str)
        -> Result<bool, DirectoryError>;
}

// ============================================================================
// In-memory directory
// ============================================================================

#[derive(Debug, Clone)]
struct StoredUser {
    identity: UserIdentity,
    password_hash: Option<String>,
}

/// Process-local directory for single-instance deployments and tests
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserDirectory {
    users: Arc<Mutex<HashMap<Uuid, StoredUser>>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|users| users.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, StoredUser>>, DirectoryError> {
        self.users
            .lock()
            .map_err(|_| DirectoryError::Unavailable("directory lock poisoned".to_string()))
    }

    fn federated_id_taken(
        users: &HashMap<Uuid, StoredUser>,
        federated_id: &str,
        except: Option<Uuid>,
    ) -> bool {
        users.values().any(|user| {
            Some(user.identity.id) != except
                && user.identity.federated_id.as_deref() == Some(federated_id)
        })
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserIdentity>, DirectoryError> {
        let users = self.lock()?;
        Ok(users
            .values()
            .find(|user| user.identity.email == email)
            .map(|user| user.identity.clone()))
    }

    async fn find_by_federated_id(
        &self,
        federated_id: &str,
    ) -> Result<Option<UserIdentity>, DirectoryError> {
        let users = self.lock()?;
        Ok(users
            .values()
            .find(|user| user.identity.federated_id.as_deref() == Some(federated_id))
            .map(|user| user.identity.clone()))
    }

    async fn get_or_create(
        &self,
        defaults: NewIdentity,
        patch: IdentityPatch,
    ) -> Result<(UserIdentity, bool), DirectoryError> {
        let mut users = self.lock()?;

        let existing = users
            .values()
            .find(|user| user.identity.email == defaults.email)
            .map(|user| user.identity.id);

        if let Some(id) = existing {
            if let Some(federated_id) = &patch.federated_id {
                if Self::federated_id_taken(&users, federated_id, Some(id)) {
                    return Err(DirectoryError::Conflict(
                        "federated id already linked to another identity".to_string(),
                    ));
                }
            }

            let user = users
                .get_mut(&id)
                .ok_or_else(|| DirectoryError::Unavailable("identity vanished".to_string()))?;
            patch.apply(&mut user.identity);
            return Ok((user.identity.clone(), false));
        }

        if let Some(federated_id) = &defaults.federated_id {
            if Self::federated_id_taken(&users, federated_id, None) {
                return Err(DirectoryError::Conflict(
                    "federated id already linked to another identity".to_string(),
                ));
            }
        }

        let now = Utc::now();
        let identity = UserIdentity {
            id: Uuid::new_v4(),
            email: defaults.email,
            federated_id: defaults.federated_id,
            email_verified: defaults.email_verified,
            registration_method: defaults.registration_method,
            first_name: defaults.first_name,
            last_name: defaults.last_name,
            has_password: defaults.password_hash.is_some(),
            created_at: now,
            updated_at: now,
        };
        users.insert(
            identity.id,
            StoredUser {
                identity: identity.clone(),
                password_hash: defaults.password_hash,
            },
        );

        Ok((identity, true))
    }

    async fn check_credential(
        &self,
        user_id: Uuid,
        secret: &str,
    ) -> Result<bool, DirectoryError> {
        let hash = {
            let users = self.lock()?;
            users.get(&user_id).and_then(|user| user.password_hash.clone())
        };

        match hash {
            Some(hash) => Ok(verify_password(secret, &hash)?),
            None => Ok(false),
        }
    }
}

// ============================================================================
// PostgreSQL directory
// ============================================================================

const USER_COLUMNS: &str = "id, email, federated_id, email_verified, registration_method, \
                            first_name, last_name, password_hash, created_at, updated_at";

/// Directory backed by the `users` table
#[derive(Debug, Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn into_identity(row: UserRow) -> Result<UserIdentity, DirectoryError> {
        UserIdentity::try_from(row).map_err(DirectoryError::Corrupt)
    }

    fn map_unique_violation(err: sqlx::Error) -> DirectoryError {
        match err {
            sqlx::Error::Database(db_err) => match db_err.constraint() {
                Some("users_email_key") | Some("users_federated_id_key") => {
                    DirectoryError::Conflict(db_err.message().to_string())
                }
                _ => DirectoryError::Database(sqlx::Error::Database(db_err)),
            },
            other => DirectoryError::Database(other),
        }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserIdentity>, DirectoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::into_identity).transpose()
    }

    async fn find_by_federated_id(
        &self,
        federated_id: &str,
    ) -> Result<Option<UserIdentity>, DirectoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE federated_id = $1",
            USER_COLUMNS
        ))
        .bind(federated_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::into_identity).transpose()
    }

    async fn get_or_create(
        &self,
        defaults: NewIdentity,
        patch: IdentityPatch,
    ) -> Result<(UserIdentity, bool), DirectoryError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let inserted = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, email, federated_id, email_verified, registration_method,
                               first_name, last_name, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            ON CONFLICT (email) DO NOTHING
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&defaults.email)
        .bind(&defaults.federated_id)
        .bind(defaults.email_verified)
        .bind(defaults.registration_method.as_str())
        .bind(&defaults.first_name)
        .bind(&defaults.last_name)
        .bind(&defaults.password_hash)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Self::map_unique_violation)?;

        if let Some(row) = inserted {
            tx.commit().await?;
            return Ok((Self::into_identity(row)?, true));
        }

        // Names and federated id only fill gaps; the password is never touched
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users SET
                email_verified = email_verified OR $2,
                first_name = CASE WHEN COALESCE(btrim(first_name), '') = ''
                                  THEN COALESCE($3, first_name) ELSE first_name END,
                last_name = CASE WHEN COALESCE(btrim(last_name), '') = ''
                                 THEN COALESCE($4, last_name) ELSE last_name END,
                federated_id = CASE WHEN federated_id IS NULL AND btrim(COALESCE($5, '')) <> ''
                                    THEN $5 ELSE federated_id END,
                updated_at = $6
            WHERE email = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&defaults.email)
        .bind(patch.mark_email_verified)
        .bind(&patch.first_name)
        .bind(&patch.last_name)
        .bind(&patch.federated_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(Self::map_unique_violation)?;

        tx.commit().await?;
        Ok((Self::into_identity(row)?, false))
    }

    async fn check_credential(
        &self,
        user_id: Uuid,
        secret: &str,
    ) -> Result<bool, DirectoryError> {
        let hash: Option<Option<String>> =
            sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        match hash.flatten() {
            Some(hash) => Ok(verify_password(secret, &hash)?),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::RegistrationMethod;
    use crate::utils::security::hash_password_with_cost;

    fn defaults(email: &str) -> NewIdentity {
        NewIdentity {
            email: email.to_string(),
            federated_id: None,
            email_verified: true,
            registration_method: RegistrationMethod::EmailOtp,
            first_name: Some("Ada".to_string()),
            last_name: None,
            password_hash: None,
        }
    }

    #[tokio::test]
    async fn test_get_or_create_creates_once() {
        let directory = InMemoryUserDirectory::new();

        let (first, created) = directory
            .get_or_create(defaults("a@example.com"), IdentityPatch::default())
            .await
            .unwrap();
        assert!(created);

        let (second, created) = directory
            .get_or_create(defaults("a@example.com"), IdentityPatch::default())
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(directory.len(), 1);
    }

    #[tokio::test]
    async fn test_existing_identity_is_patched_not_overwritten() {
        let directory = InMemoryUserDirectory::new();
        let mut unverified = defaults("a@example.com");
        unverified.email_verified = false;
        directory
            .get_or_create(unverified, IdentityPatch::default())
            .await
            .unwrap();

        let patch = IdentityPatch {
            mark_email_verified: true,
            first_name: Some("Grace".to_string()),
            last_name: Some("Hopper".to_string()),
            federated_id: None,
        };
        let mut other_defaults = defaults("a@example.com");
        other_defaults.password_hash = Some("ignored".to_string());

        let (user, created) = directory.get_or_create(other_defaults, patch).await.unwrap();
        assert!(!created);
        assert!(user.email_verified);
        assert_eq!(user.first_name.as_deref(), Some("Ada"));
        assert_eq!(user.last_name.as_deref(), Some("Hopper"));
        assert!(!user.has_password);
    }

    #[tokio::test]
    async fn test_federated_id_uniqueness() {
        let directory = InMemoryUserDirectory::new();
        let mut linked = defaults("a@example.com");
        linked.federated_id = Some("google-1".to_string());
        directory
            .get_or_create(linked, IdentityPatch::default())
            .await
            .unwrap();

        let mut clash = defaults("b@example.com");
        clash.federated_id = Some("google-1".to_string());
        let result = directory.get_or_create(clash, IdentityPatch::default()).await;
        assert!(matches!(result, Err(DirectoryError::Conflict(_))));

        let found = directory.find_by_federated_id("google-1").await.unwrap();
        assert_eq!(found.unwrap().email, "a@example.com");
    }

    #[tokio::test]
    async fn test_check_credential() {
        let directory = InMemoryUserDirectory::new();
        let mut with_password = defaults("a@example.com");
        with_password.password_hash = Some(hash_password_with_cost("s3cret-pass", 4).unwrap());
        let (user, _) = directory
            .get_or_create(with_password, IdentityPatch::default())
            .await
            .unwrap();

        assert!(user.has_password);
        assert!(directory.check_credential(user.id, "s3cret-pass").await.unwrap());
        assert!(!directory.check_credential(user.id, "wrong").await.unwrap());
        assert!(!directory
            .check_credential(Uuid::new_v4(), "s3cret-pass")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_yields_one_identity() {
        let directory = InMemoryUserDirectory::new();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let directory = directory.clone();
            handles.push(tokio::spawn(async move {
                directory
                    .get_or_create(defaults("race@example.com"), IdentityPatch::default())
                    .await
                    .unwrap()
            }));
        }

        let mut ids = Vec::new();
        let mut created = 0;
        for handle in handles {
            let (user, was_created) = handle.await.unwrap();
            ids.push(user.id);
            if was_created {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        ids.dedup();
        assert_eq!(ids.len(), 1);
    }
}
