//! PostgreSQL ephemeral store
//!
//! Durable fallback backed by the `ephemeral_entries` table. Conditional
//! `UPDATE`/`DELETE` statements give compare-and-swap semantics across
//! service instances sharing the database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use super::{EphemeralStore, StoreError};

/// Store backed by the `ephemeral_entries` table
#[derive(Debug, Clone)]
pub struct PgEphemeralStore {
    pool: PgPool,
}

impl PgEphemeralStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EphemeralStore for PgEphemeralStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query(
            "SELECT value FROM ephemeral_entries WHERE key = $1 AND expires_at > NOW()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        key: &str,
        value: String,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO ephemeral_entries (key, value, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM ephemeral_entries WHERE key = $1 RETURNING expires_at > NOW() AS live",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match result {
            Some(row) => Ok(row.try_get::<bool, _>("live")?),
            None => Ok(false),
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        replacement: Option<String>,
    ) -> Result<bool, StoreError> {
        let result = match replacement {
            Some(value) => {
                sqlx::query(
                    r#"
                    UPDATE ephemeral_entries
                    SET value = $3
                    WHERE key = $1 AND value = $2 AND expires_at > NOW()
                    "#,
                )
                .bind(key)
                .bind(expected)
                .bind(value)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    DELETE FROM ephemeral_entries
                    WHERE key = $1 AND value = $2 AND expires_at > NOW()
                    "#,
                )
                .bind(key)
                .bind(expected)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected() == 1)
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM ephemeral_entries WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
