/// User model and database operations
///
/// Users belong to exactly one organization and carry a set of roles
/// (ADMIN, QA, BA, TESTER). Roles are stored one row per role in
/// `user_roles` so the set can be replaced atomically.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     organization_id UUID NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
///     email CITEXT NOT NULL UNIQUE,
///     email_verified BOOLEAN NOT NULL DEFAULT FALSE,
///     password_hash VARCHAR(255) NOT NULL,
///     name VARCHAR(255) NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     last_login_at TIMESTAMPTZ
/// );
///
/// CREATE TYPE user_role AS ENUM ('ADMIN', 'QA', 'BA', 'TESTER');
///
/// CREATE TABLE user_roles (
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     role user_role NOT NULL,
///     PRIMARY KEY (user_id, role)
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use tcm_shared::models::user::{CreateUser, User, UserRole};
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, organization_id: Uuid) -> Result<(), sqlx::Error> {
/// let mut tx = pool.begin().await?;
/// let user = User::create(&mut *tx, CreateUser {
///     organization_id,
///     email: "qa@example.com".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     name: "Quinn".to_string(),
///     roles: vec![UserRole::Qa],
/// }).await?;
/// tx.commit().await?;
///
/// let roles = User::roles(&pool, user.id).await?;
/// assert_eq!(roles, vec![UserRole::Qa]);
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgHasArrayType, PgTypeInfo};
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

/// Role granted to a user within their organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    /// Manages the organization, its users and projects
    Admin,

    /// Quality assurance: authors and executes test cases
    Qa,

    /// Business analyst: authors test cases and reads reports
    Ba,

    /// Executes assigned tests
    Tester,
}

impl UserRole {
    pub const ALL: [UserRole; 4] = [UserRole::Admin, UserRole::Qa, UserRole::Ba, UserRole::Tester];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "ADMIN",
            UserRole::Qa => "QA",
            UserRole::Ba => "BA",
            UserRole::Tester => "TESTER",
        }
    }

    /// Parses a role name, ignoring case
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Some(UserRole::Admin),
            "QA" => Some(UserRole::Qa),
            "BA" => Some(UserRole::Ba),
            "TESTER" => Some(UserRole::Tester),
            _ => None,
        }
    }
}

impl PgHasArrayType for UserRole {
    fn array_type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("_user_role")
    }
}

/// Sorts and de-duplicates a role list
pub fn normalize_roles(mut roles: Vec<UserRole>) -> Vec<UserRole> {
    roles.sort();
    roles.dedup();
    roles
}

/// User account row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,

    pub organization_id: Uuid,

    /// Email address (case-insensitive via CITEXT, unique across organizations)
    pub email: String,

    pub email_verified: bool,

    /// Argon2id password hash, never serialized
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    pub name: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub last_login_at: Option<DateTime<Utc>>,
}

/// Public view of a user together with their roles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub email: String,
    pub name: String,
    pub email_verified: bool,
    pub roles: Vec<UserRole>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    pub fn new(user: User, roles: Vec<UserRole>) -> Self {
        Self {
            id: user.id,
            organization_id: user.organization_id,
            email: user.email,
            name: user.name,
            email_verified: user.email_verified,
            roles,
            created_at: user.created_at,
            last_login_at: user.last_login_at,
        }
    }
}

/// Input for creating a new user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub organization_id: Uuid,

    pub email: String,

    /// Argon2id password hash (NOT plaintext password!)
    pub password_hash: String,

    pub name: String,

    pub roles: Vec<UserRole>,
}

/// Column list for `User` rows; `email` is cast from CITEXT so it decodes as TEXT
pub(crate) const USER_COLUMNS: &str = "id, organization_id, email::TEXT AS email, email_verified, \
                                       password_hash, name, created_at, updated_at, last_login_at";

impl User {
    /// Creates a user and their role rows
    ///
    /// Runs on a connection so callers can bundle it with organization
    /// creation or invitation acceptance.
    ///
    /// # Errors
    ///
    /// Fails with a unique violation (`users_email_key`) if the email is taken.
    pub async fn create(conn: &mut PgConnection, data: CreateUser) -> Result<Self, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (organization_id, email, password_hash, name)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(data.organization_id)
        .bind(&data.email)
        .bind(&data.password_hash)
        .bind(&data.name)
        .fetch_one(&mut *conn)
        .await?;

        Self::set_roles(conn, user.id, &data.roles).await?;

        Ok(user)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Finds a user inside one organization
    pub async fn find_by_id_and_org(
        pool: &PgPool,
        id: Uuid,
        organization_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND organization_id = $2"
        ))
        .bind(id)
        .bind(organization_id)
        .fetch_optional(pool)
        .await
    }

    /// Finds a user by email address (case-insensitive)
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1::citext"))
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    /// Lists the users of an organization ordered by name
    pub async fn list_by_organization(
        pool: &PgPool,
        organization_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE organization_id = $1 ORDER BY name ASC, email ASC"
        ))
        .bind(organization_id)
        .fetch_all(pool)
        .await
    }

    /// Returns the roles of one user, sorted
    pub async fn roles(pool: &PgPool, user_id: Uuid) -> Result<Vec<UserRole>, sqlx::Error> {
        sqlx::query_scalar::<_, UserRole>(
            "SELECT role FROM user_roles WHERE user_id = $1 ORDER BY role",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Returns roles for many users at once, keyed by user ID
    pub async fn roles_for_users(
        pool: &PgPool,
        user_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<UserRole>>, sqlx::Error> {
        let rows: Vec<(Uuid, UserRole)> = sqlx::query_as(
            "SELECT user_id, role FROM user_roles WHERE user_id = ANY($1) ORDER BY user_id, role",
        )
        .bind(user_ids)
        .fetch_all(pool)
        .await?;

        let mut roles: HashMap<Uuid, Vec<UserRole>> = HashMap::new();
        for (user_id, role) in rows {
            roles.entry(user_id).or_default().push(role);
        }

        Ok(roles)
    }

    /// Replaces the role set of a user
    pub async fn set_roles(
        conn: &mut PgConnection,
        user_id: Uuid,
        roles: &[UserRole],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *conn)
            .await?;

        for role in normalize_roles(roles.to_vec()) {
            sqlx::query("INSERT INTO user_roles (user_id, role) VALUES ($1, $2)")
                .bind(user_id)
                .bind(role)
                .execute(&mut *conn)
                .await?;
        }

        Ok(())
    }

    /// Locks the ADMIN role rows of an organization and returns their users
    ///
    /// Role changes that may remove an admin call this first in their
    /// transaction, so two of them can't each see the other as the admin
    /// that remains.
    pub async fn lock_admin_ids(conn: &mut PgConnection, organization_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT r.user_id
            FROM user_roles r
            JOIN users u ON u.id = r.user_id
            WHERE u.organization_id = $1 AND r.role = 'ADMIN'
            FOR UPDATE OF r
            "#,
        )
        .bind(organization_id)
        .fetch_all(conn)
        .await
    }

    /// Updates the last login timestamp for a user
    pub async fn update_last_login(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Marks the user's email address as verified
    pub async fn mark_email_verified(conn: &mut PgConnection, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET email_verified = TRUE, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes a user of an organization
    ///
    /// Role rows, assignments and verification tokens cascade; executions keep
    /// their history with `assigned_to`/`created_by` set to NULL.
    pub async fn delete(pool: &PgPool, id: Uuid, organization_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(organization_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_role_as_str() {
        assert_eq!(UserRole::Admin.as_str(), "ADMIN");
        assert_eq!(UserRole::Qa.as_str(), "QA");
        assert_eq!(UserRole::Ba.as_str(), "BA");
        assert_eq!(UserRole::Tester.as_str(), "TESTER");
    }

    #[test]
    fn test_user_role_parse() {
        assert_eq!(UserRole::parse("admin"), Some(UserRole::Admin));
        assert_eq!(UserRole::parse(" Tester "), Some(UserRole::Tester));
        assert_eq!(UserRole::parse("owner"), None);
    }

    #[test]
    fn test_user_role_serde_uses_uppercase() {
        let json = serde_json::to_string(&vec![UserRole::Qa, UserRole::Tester]).unwrap();
        assert_eq!(json, r#"["QA","TESTER"]"#);

        let parsed: UserRole = serde_json::from_str(r#""BA""#).unwrap();
        assert_eq!(parsed, UserRole::Ba);
    }

    #[test]
    fn test_normalize_roles() {
        let roles = normalize_roles(vec![UserRole::Tester, UserRole::Admin, UserRole::Tester]);
        assert_eq!(roles, vec![UserRole::Admin, UserRole::Tester]);
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            email: "a@example.com".to_string(),
            email_verified: false,
            password_hash: "$argon2id$secret".to_string(),
            name: "A".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_login_at: None,
        };

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "a@example.com");
    }
}
