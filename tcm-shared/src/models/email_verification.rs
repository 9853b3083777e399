/// Email verification tokens
///
/// Issued at signup and on request; valid for 24 hours. Issuing a new token
/// invalidates the user's older unverified tokens.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE email_verifications (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     token_hash VARCHAR(64) NOT NULL UNIQUE,
///     expires_at TIMESTAMPTZ NOT NULL,
///     verified_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// How long a verification token is valid
pub fn verification_ttl() -> Duration {
    Duration::hours(24)
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmailVerification {
    pub id: Uuid,

    pub user_id: Uuid,

    #[serde(skip_serializing, default)]
    pub token_hash: String,

    pub expires_at: DateTime<Utc>,

    pub verified_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

const VERIFICATION_COLUMNS: &str = "id, user_id, token_hash, expires_at, verified_at, created_at";

impl EmailVerification {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.verified_at.is_none() && self.expires_at > now
    }

    /// Stores a new token hash for a user, dropping their unused tokens
    pub async fn create(
        conn: &mut PgConnection,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query("DELETE FROM email_verifications WHERE user_id = $1 AND verified_at IS NULL")
            .bind(user_id)
            .execute(&mut *conn)
            .await?;

        sqlx::query_as::<_, EmailVerification>(&format!(
            r#"
            INSERT INTO email_verifications (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING {VERIFICATION_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .fetch_one(&mut *conn)
        .await
    }

    /// Finds a token by hash and locks it
    pub async fn find_by_token_hash_for_update(
        conn: &mut PgConnection,
        token_hash: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, EmailVerification>(&format!(
            "SELECT {VERIFICATION_COLUMNS} FROM email_verifications WHERE token_hash = $1 FOR UPDATE"
        ))
        .bind(token_hash)
        .fetch_optional(conn)
        .await
    }

    pub async fn mark_verified(conn: &mut PgConnection, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE email_verifications SET verified_at = NOW() WHERE id = $1 AND verified_at IS NULL",
        )
        .bind(id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes up to `limit` tokens that are expired or already used
    pub async fn purge_stale(pool: &PgPool, limit: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM email_verifications
            WHERE id IN (
                SELECT id FROM email_verifications
                WHERE verified_at IS NOT NULL OR expires_at <= NOW()
                LIMIT $1
            )
            "#,
        )
        .bind(limit)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }
}
