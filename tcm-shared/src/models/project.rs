/// Project model and database operations
///
/// Projects are the top level of the test hierarchy inside an organization.
/// Names are unique per organization (`projects_organization_name_key`).
/// Users are assigned to projects through `project_users`; an assignment
/// grants visibility of every module in the project.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE projects (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     organization_id UUID NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
///     name VARCHAR(255) NOT NULL,
///     description TEXT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CONSTRAINT projects_organization_name_key UNIQUE (organization_id, name)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::user::{User, USER_COLUMNS};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,

    pub organization_id: Uuid,

    pub name: String,

    pub description: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProject {
    pub organization_id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

/// Fields that can be changed on a project
///
/// `description: Some(None)` clears the description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
}

const PROJECT_COLUMNS: &str = "id, organization_id, name, description, created_at, updated_at";

impl Project {
    /// Creates a project
    ///
    /// # Errors
    ///
    /// Unique violation on `projects_organization_name_key` when the name is
    /// already used in the organization.
    pub async fn create(pool: &PgPool, data: CreateProject) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!(
            r#"
            INSERT INTO projects (organization_id, name, description)
            VALUES ($1, $2, $3)
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(data.organization_id)
        .bind(data.name.trim())
        .bind(data.description)
        .fetch_one(pool)
        .await
    }

    /// Finds a project by ID within an organization
    pub async fn find_by_id_and_org(
        pool: &PgPool,
        id: Uuid,
        organization_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1 AND organization_id = $2"
        ))
        .bind(id)
        .bind(organization_id)
        .fetch_optional(pool)
        .await
    }

    /// Lists every project of an organization
    pub async fn list_by_organization(
        pool: &PgPool,
        organization_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE organization_id = $1 ORDER BY name ASC"
        ))
        .bind(organization_id)
        .fetch_all(pool)
        .await
    }

    /// Lists the projects a non-admin user can see
    ///
    /// A project is visible when the user is assigned to it or to any of its
    /// modules.
    pub async fn list_visible_to(
        pool: &PgPool,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!(
            r#"
            SELECT {PROJECT_COLUMNS}
            FROM projects p
            WHERE p.organization_id = $1
              AND (
                EXISTS (SELECT 1 FROM project_users pu WHERE pu.project_id = p.id AND pu.user_id = $2)
                OR EXISTS (
                    SELECT 1 FROM module_users mu
                    JOIN test_modules m ON m.id = mu.module_id
                    WHERE m.project_id = p.id AND mu.user_id = $2
                )
              )
            ORDER BY p.name ASC
            "#
        ))
        .bind(organization_id)
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Updates a project; only `Some` fields change
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        organization_id: Uuid,
        data: UpdateProject,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE projects SET updated_at = NOW()");
        let mut bind_count = 2;

        if data.name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", name = ${}", bind_count));
        }
        if data.description.is_some() {
            bind_count += 1;
            query.push_str(&format!(", description = ${}", bind_count));
        }

        query.push_str(&format!(
            " WHERE id = $1 AND organization_id = $2 RETURNING {PROJECT_COLUMNS}"
        ));

        let mut q = sqlx::query_as::<_, Project>(&query).bind(id).bind(organization_id);

        if let Some(name) = data.name {
            q = q.bind(name.trim().to_string());
        }
        if let Some(description) = data.description {
            q = q.bind(description);
        }

        q.fetch_optional(pool).await
    }

    /// Whether a user is directly assigned to the project
    pub async fn is_assigned(pool: &PgPool, project_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM project_users WHERE project_id = $1 AND user_id = $2)",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    /// Whether a user can see the project through any assignment
    pub async fn is_visible_to(pool: &PgPool, project_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS(SELECT 1 FROM project_users WHERE project_id = $1 AND user_id = $2)
                OR EXISTS(
                    SELECT 1 FROM module_users mu
                    JOIN test_modules m ON m.id = mu.module_id
                    WHERE m.project_id = $1 AND mu.user_id = $2
                )
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    /// Replaces the set of users assigned to a project
    ///
    /// Callers must have checked that every user belongs to the project's
    /// organization.
    pub async fn set_assigned_users(
        conn: &mut PgConnection,
        project_id: Uuid,
        user_ids: &[Uuid],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM project_users WHERE project_id = $1 AND NOT (user_id = ANY($2))")
            .bind(project_id)
            .bind(user_ids)
            .execute(&mut *conn)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO project_users (project_id, user_id)
            SELECT $1, UNNEST($2::uuid[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(project_id)
        .bind(user_ids)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Lists users directly assigned to a project
    pub async fn assigned_users(pool: &PgPool, project_id: Uuid) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE id IN (SELECT user_id FROM project_users WHERE project_id = $1)
            ORDER BY name ASC
            "#
        ))
        .bind(project_id)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_project_default() {
        let update = UpdateProject::default();
        assert!(update.name.is_none());
        assert!(update.description.is_none());
    }
}
