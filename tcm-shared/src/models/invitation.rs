/// Invitation model and database operations
///
/// Admins invite people into their organization by email with a fixed set of
/// roles. An invitation is pending until it is accepted or expires (7 days);
/// re-inviting the same address replaces the pending invitation.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE invitations (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     organization_id UUID NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
///     email CITEXT NOT NULL,
///     roles user_role[] NOT NULL,
///     token_hash VARCHAR(64) NOT NULL UNIQUE,
///     invited_by UUID REFERENCES users(id) ON DELETE SET NULL,
///     expires_at TIMESTAMPTZ NOT NULL,
///     accepted_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::user::UserRole;

/// How long an invitation can be accepted
pub fn invitation_ttl() -> Duration {
    Duration::days(7)
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Invitation {
    pub id: Uuid,

    pub organization_id: Uuid,

    pub email: String,

    pub roles: Vec<UserRole>,

    /// SHA-256 of the token, never serialized
    #[serde(skip_serializing, default)]
    pub token_hash: String,

    pub invited_by: Option<Uuid>,

    pub expires_at: DateTime<Utc>,

    pub accepted_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateInvitation {
    pub organization_id: Uuid,
    pub email: String,
    pub roles: Vec<UserRole>,
    pub token_hash: String,
    pub invited_by: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
}

const INVITATION_COLUMNS: &str = "id, organization_id, email::TEXT AS email, roles, token_hash, \
                                  invited_by, expires_at, accepted_at, created_at";

impl Invitation {
    /// Whether the invitation can still be accepted at `now`
    pub fn is_pending(&self, now: DateTime<Utc>) -> bool {
        self.accepted_at.is_none() && self.expires_at > now
    }

    /// Creates an invitation, replacing any pending one for the same address
    pub async fn create(conn: &mut PgConnection, data: CreateInvitation) -> Result<Self, sqlx::Error> {
        sqlx::query(
            r#"
            DELETE FROM invitations
            WHERE organization_id = $1 AND email = $2::citext AND accepted_at IS NULL
            "#,
        )
        .bind(data.organization_id)
        .bind(&data.email)
        .execute(&mut *conn)
        .await?;

        sqlx::query_as::<_, Invitation>(&format!(
            r#"
            INSERT INTO invitations (organization_id, email, roles, token_hash, invited_by, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {INVITATION_COLUMNS}
            "#
        ))
        .bind(data.organization_id)
        .bind(&data.email)
        .bind(&data.roles)
        .bind(&data.token_hash)
        .bind(data.invited_by)
        .bind(data.expires_at)
        .fetch_one(&mut *conn)
        .await
    }

    /// Lists invitations of an organization that can still be accepted
    pub async fn list_pending(pool: &PgPool, organization_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Invitation>(&format!(
            r#"
            SELECT {INVITATION_COLUMNS}
            FROM invitations
            WHERE organization_id = $1 AND accepted_at IS NULL AND expires_at > NOW()
            ORDER BY created_at DESC
            "#
        ))
        .bind(organization_id)
        .fetch_all(pool)
        .await
    }

    /// Finds an invitation by token hash and locks it for acceptance
    pub async fn find_by_token_hash_for_update(
        conn: &mut PgConnection,
        token_hash: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Invitation>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE token_hash = $1 FOR UPDATE"
        ))
        .bind(token_hash)
        .fetch_optional(conn)
        .await
    }

    pub async fn mark_accepted(conn: &mut PgConnection, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE invitations SET accepted_at = NOW() WHERE id = $1 AND accepted_at IS NULL",
        )
        .bind(id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Revokes a pending invitation
    ///
    /// Returns false if it doesn't exist, belongs to another organization or
    /// was already accepted.
    pub async fn revoke(pool: &PgPool, id: Uuid, organization_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM invitations WHERE id = $1 AND organization_id = $2 AND accepted_at IS NULL",
        )
        .bind(id)
        .bind(organization_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes up to `limit` invitations that expired without being accepted
    pub async fn purge_expired(pool: &PgPool, limit: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM invitations
            WHERE id IN (
                SELECT id FROM invitations
                WHERE accepted_at IS NULL AND expires_at <= NOW()
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
