/// Test suite model and database operations
///
/// Suites (called submodules in some parts of the UI) group test cases inside
/// a module.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE test_suites (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     module_id UUID NOT NULL REFERENCES test_modules(id) ON DELETE CASCADE,
///     name VARCHAR(255) NOT NULL,
///     description TEXT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::test_module::ModuleScope;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TestSuite {
    pub id: Uuid,

    pub module_id: Uuid,

    pub name: String,

    pub description: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTestSuite {
    pub module_id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTestSuite {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
}

const SUITE_COLUMNS: &str = "id, module_id, name, description, created_at, updated_at";

impl TestSuite {
    pub async fn create(pool: &PgPool, data: CreateTestSuite) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, TestSuite>(&format!(
            r#"
            INSERT INTO test_suites (module_id, name, description)
            VALUES ($1, $2, $3)
            RETURNING {SUITE_COLUMNS}
            "#
        ))
        .bind(data.module_id)
        .bind(data.name.trim())
        .bind(data.description)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TestSuite>(&format!(
            "SELECT {SUITE_COLUMNS} FROM test_suites WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Resolves the module, project and organization of a suite
    pub async fn scope(pool: &PgPool, id: Uuid) -> Result<Option<ModuleScope>, sqlx::Error> {
        sqlx::query_as::<_, ModuleScope>(
            r#"
            SELECT s.module_id, m.project_id, p.organization_id
            FROM test_suites s
            JOIN test_modules m ON m.id = s.module_id
            JOIN projects p ON p.id = m.project_id
            WHERE s.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_by_module(pool: &PgPool, module_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, TestSuite>(&format!(
            "SELECT {SUITE_COLUMNS} FROM test_suites WHERE module_id = $1 ORDER BY name ASC"
        ))
        .bind(module_id)
        .fetch_all(pool)
        .await
    }

    /// Updates a suite; only `Some` fields change
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateTestSuite,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE test_suites SET updated_at = NOW()");
        let mut bind_count = 1;

        if data.name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", name = ${}", bind_count));
        }
        if data.description.is_some() {
            bind_count += 1;
            query.push_str(&format!(", description = ${}", bind_count));
        }

        query.push_str(&format!(" WHERE id = $1 RETURNING {SUITE_COLUMNS}"));

        let mut q = sqlx::query_as::<_, TestSuite>(&query).bind(id);

        if let Some(name) = data.name {
            q = q.bind(name.trim().to_string());
        }
        if let Some(description) = data.description {
            q = q.bind(description);
        }

        q.fetch_optional(pool).await
    }
}
