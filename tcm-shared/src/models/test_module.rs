/// Test module model and database operations
///
/// Modules group suites inside a project. Users can be assigned to a single
/// module without being assigned to the whole project; such an assignment
/// also makes the parent project visible to them.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE test_modules (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
///     name VARCHAR(255) NOT NULL,
///     description TEXT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE TABLE module_users (
///     module_id UUID NOT NULL REFERENCES test_modules(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     assigned_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     PRIMARY KEY (module_id, user_id)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::user::{User, USER_COLUMNS};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TestModule {
    pub id: Uuid,

    pub project_id: Uuid,

    pub name: String,

    pub description: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTestModule {
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTestModule {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
}

/// A module joined with the organization that owns it
///
/// Used by access checks, which need the organization and the project in one
/// lookup.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ModuleScope {
    pub module_id: Uuid,
    pub project_id: Uuid,
    pub organization_id: Uuid,
}

const MODULE_COLUMNS: &str = "id, project_id, name, description, created_at, updated_at";

impl TestModule {
    pub async fn create(pool: &PgPool, data: CreateTestModule) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, TestModule>(&format!(
            r#"
            INSERT INTO test_modules (project_id, name, description)
            VALUES ($1, $2, $3)
            RETURNING {MODULE_COLUMNS}
            "#
        ))
        .bind(data.project_id)
        .bind(data.name.trim())
        .bind(data.description)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TestModule>(&format!(
            "SELECT {MODULE_COLUMNS} FROM test_modules WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Resolves the project and organization of a module
    pub async fn scope(pool: &PgPool, id: Uuid) -> Result<Option<ModuleScope>, sqlx::Error> {
        sqlx::query_as::<_, ModuleScope>(
            r#"
            SELECT m.id AS module_id, m.project_id, p.organization_id
            FROM test_modules m
            JOIN projects p ON p.id = m.project_id
            WHERE m.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Lists all modules of a project ordered by name
    pub async fn list_by_project(pool: &PgPool, project_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, TestModule>(&format!(
            "SELECT {MODULE_COLUMNS} FROM test_modules WHERE project_id = $1 ORDER BY name ASC"
        ))
        .bind(project_id)
        .fetch_all(pool)
        .await
    }

    /// Lists the modules of a project that a non-admin user can see
    ///
    /// Assignment to the project exposes every module; otherwise only modules
    /// the user is assigned to are returned.
    pub async fn list_visible_to(
        pool: &PgPool,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, TestModule>(&format!(
            r#"
            SELECT {MODULE_COLUMNS}
            FROM test_modules m
            WHERE m.project_id = $1
              AND (
                EXISTS (SELECT 1 FROM project_users pu WHERE pu.project_id = m.project_id AND pu.user_id = $2)
                OR EXISTS (SELECT 1 FROM module_users mu WHERE mu.module_id = m.id AND mu.user_id = $2)
              )
            ORDER BY m.name ASC
            "#
        ))
        .bind(project_id)
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Updates a module; only `Some` fields change
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateTestModule,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE test_modules SET updated_at = NOW()");
        let mut bind_count = 1;

        if data.name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", name = ${}", bind_count));
        }
        if data.description.is_some() {
            bind_count += 1;
            query.push_str(&format!(", description = ${}", bind_count));
        }

        query.push_str(&format!(" WHERE id = $1 RETURNING {MODULE_COLUMNS}"));

        let mut q = sqlx::query_as::<_, TestModule>(&query).bind(id);

        if let Some(name) = data.name {
            q = q.bind(name.trim().to_string());
        }
        if let Some(description) = data.description {
            q = q.bind(description);
        }

        q.fetch_optional(pool).await
    }

    /// Whether a user can see the module
    ///
    /// True when assigned to the module itself or to its project.
    pub async fn is_visible_to(pool: &PgPool, module_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS(SELECT 1 FROM module_users WHERE module_id = $1 AND user_id = $2)
                OR EXISTS(
                    SELECT 1 FROM project_users pu
                    JOIN test_modules m ON m.project_id = pu.project_id
                    WHERE m.id = $1 AND pu.user_id = $2
                )
            "#,
        )
        .bind(module_id)
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    /// Replaces the set of users assigned to a module
    pub async fn set_assigned_users(
        conn: &mut PgConnection,
        module_id: Uuid,
        user_ids: &[Uuid],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM module_users WHERE module_id = $1 AND NOT (user_id = ANY($2))")
            .bind(module_id)
            .bind(user_ids)
            .execute(&mut *conn)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO module_users (module_id, user_id)
            SELECT $1, UNNEST($2::uuid[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(module_id)
        .bind(user_ids)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Removes one user from a module
    ///
    /// Returns false if the user wasn't assigned.
    pub async fn unassign_user(pool: &PgPool, module_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM module_users WHERE module_id = $1 AND user_id = $2")
            .bind(module_id)
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists users directly assigned to a module
    pub async fn assigned_users(pool: &PgPool, module_id: Uuid) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE id IN (SELECT user_id FROM module_users WHERE module_id = $1)
            ORDER BY name ASC
            "#
        ))
        .bind(module_id)
        .fetch_all(pool)
        .await
    }
}
