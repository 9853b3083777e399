/// Organization model and database operations
///
/// Organizations are the tenant boundary. Every project and user belongs to
/// exactly one organization, and every query issued on behalf of a user is
/// scoped to that user's organization.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE organizations (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(255) NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Tenant owning projects and users
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Organization {
    pub id: Uuid,

    pub name: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Organization {
    /// Creates a new organization
    ///
    /// Takes a connection so signup can create the organization and its first
    /// administrator in one transaction.
    pub async fn create(conn: &mut PgConnection, name: &str) -> Result<Self, sqlx::Error> {
        let organization = sqlx::query_as::<_, Organization>(
            r#"
            INSERT INTO organizations (name)
            VALUES ($1)
            RETURNING id, name, created_at, updated_at
            "#,
        )
        .bind(name)
        .fetch_one(conn)
        .await?;

        Ok(organization)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let organization = sqlx::query_as::<_, Organization>(
            r#"
            SELECT id, name, created_at, updated_at
            FROM organizations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(organization)
    }

    /// Renames an organization
    ///
    /// Returns None if the organization doesn't exist.
    pub async fn rename(pool: &PgPool, id: Uuid, name: &str) -> Result<Option<Self>, sqlx::Error> {
        let organization = sqlx::query_as::<_, Organization>(
            r#"
            UPDATE organizations
            SET name = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(name)
        .fetch_optional(pool)
        .await?;

        Ok(organization)
    }

    /// Deletes an organization and, through foreign keys, everything it owns
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM organizations WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
