/// Test case and test step models
///
/// A test case lives in a suite and owns an ordered list of steps. Steps are
/// always numbered 1..N by position: callers pass them in order and the
/// numbers are assigned here, never taken from input.
///
/// The human-readable `case_id` (for example `LOGIN-001`) is unique within a
/// module. The database can't express that constraint across the suite join,
/// so `case_id_taken` and `case_ids_in_module` first lock the module row and
/// are called inside the same transaction as the write. A second writer to
/// the same module waits at that lock until the first one commits.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE test_priority AS ENUM ('LOW', 'MEDIUM', 'HIGH', 'CRITICAL');
///
/// CREATE TABLE test_cases (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     suite_id UUID NOT NULL REFERENCES test_suites(id) ON DELETE CASCADE,
///     case_id VARCHAR(100) NOT NULL,
///     title VARCHAR(500) NOT NULL,
///     description TEXT,
///     priority test_priority NOT NULL DEFAULT 'MEDIUM',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE TABLE test_steps (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     test_case_id UUID NOT NULL REFERENCES test_cases(id) ON DELETE CASCADE,
///     step_number INTEGER NOT NULL CHECK (step_number >= 1),
///     action TEXT NOT NULL,
///     expected_result TEXT,
///     CONSTRAINT test_steps_case_number_key UNIQUE (test_case_id, step_number)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::test_module::ModuleScope;

/// Test case priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "test_priority", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
            Priority::Critical => "CRITICAL",
        }
    }

    /// Parses a priority name, ignoring case and surrounding whitespace
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "LOW" => Some(Priority::Low),
            "MEDIUM" => Some(Priority::Medium),
            "HIGH" => Some(Priority::High),
            "CRITICAL" => Some(Priority::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TestCase {
    pub id: Uuid,

    pub suite_id: Uuid,

    /// Human-readable identifier, unique within the module
    pub case_id: String,

    pub title: String,

    pub description: Option<String>,

    pub priority: Priority,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TestStep {
    pub id: Uuid,

    pub test_case_id: Uuid,

    /// Position of the step, starting at 1
    pub step_number: i32,

    pub action: String,

    pub expected_result: Option<String>,
}

/// Step content as supplied by a client or an import; numbering is implicit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInput {
    pub action: String,

    #[serde(default)]
    pub expected_result: Option<String>,
}

/// A test case together with its ordered steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseWithSteps {
    #[serde(flatten)]
    pub test_case: TestCase,

    pub steps: Vec<TestStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTestCase {
    pub suite_id: Uuid,
    pub case_id: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub steps: Vec<StepInput>,
}

/// Changes to a test case
///
/// `steps: Some(..)` replaces the full step list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTestCase {
    pub case_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub steps: Option<Vec<StepInput>>,
}

/// Column widths of `test_cases.case_id` and `test_cases.title`, in characters
pub const MAX_CASE_ID_CHARS: usize = 100;
pub const MAX_TITLE_CHARS: usize = 500;

const CASE_COLUMNS: &str =
    "id, suite_id, case_id, title, description, priority, created_at, updated_at";

const STEP_COLUMNS: &str = "id, test_case_id, step_number, action, expected_result";

impl TestCase {
    /// Creates a test case and its steps
    ///
    /// Callers check `case_id_taken` on the same connection first.
    pub async fn create(conn: &mut PgConnection, data: CreateTestCase) -> Result<TestCaseWithSteps, sqlx::Error> {
        let test_case = sqlx::query_as::<_, TestCase>(&format!(
            r#"
            INSERT INTO test_cases (suite_id, case_id, title, description, priority)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {CASE_COLUMNS}
            "#
        ))
        .bind(data.suite_id)
        .bind(data.case_id.trim())
        .bind(data.title.trim())
        .bind(data.description)
        .bind(data.priority)
        .fetch_one(&mut *conn)
        .await?;

        let steps = Self::replace_steps(&mut *conn, test_case.id, &data.steps).await?;

        Ok(TestCaseWithSteps { test_case, steps })
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TestCase>(&format!("SELECT {CASE_COLUMNS} FROM test_cases WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Loads a test case with its steps
    pub async fn find_with_steps(pool: &PgPool, id: Uuid) -> Result<Option<TestCaseWithSteps>, sqlx::Error> {
        let Some(test_case) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };

        let steps = Self::steps(pool, id).await?;

        Ok(Some(TestCaseWithSteps { test_case, steps }))
    }

    /// Resolves the module, project and organization of a test case
    pub async fn scope(pool: &PgPool, id: Uuid) -> Result<Option<ModuleScope>, sqlx::Error> {
        sqlx::query_as::<_, ModuleScope>(
            r#"
            SELECT s.module_id, m.project_id, p.organization_id
            FROM test_cases c
            JOIN test_suites s ON s.id = c.suite_id
            JOIN test_modules m ON m.id = s.module_id
            JOIN projects p ON p.id = m.project_id
            WHERE c.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Lists the test cases of a suite ordered by case ID, without steps
    pub async fn list_by_suite(pool: &PgPool, suite_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, TestCase>(&format!(
            "SELECT {CASE_COLUMNS} FROM test_cases WHERE suite_id = $1 ORDER BY case_id ASC"
        ))
        .bind(suite_id)
        .fetch_all(pool)
        .await
    }

    /// Loads every case of a suite with steps
    pub async fn list_by_suite_with_steps(
        pool: &PgPool,
        suite_id: Uuid,
    ) -> Result<Vec<TestCaseWithSteps>, sqlx::Error> {
        let cases = Self::list_by_suite(pool, suite_id).await?;
        Self::attach_steps(pool, cases).await
    }

    /// Loads every case of a module with steps, ordered by suite then case ID
    pub async fn list_by_module_with_steps(
        pool: &PgPool,
        module_id: Uuid,
    ) -> Result<Vec<TestCaseWithSteps>, sqlx::Error> {
        let cases = sqlx::query_as::<_, TestCase>(
            r#"
            SELECT c.id, c.suite_id, c.case_id, c.title, c.description, c.priority,
                   c.created_at, c.updated_at
            FROM test_cases c
            JOIN test_suites s ON s.id = c.suite_id
            WHERE s.module_id = $1
            ORDER BY s.name ASC, c.case_id ASC
            "#,
        )
        .bind(module_id)
        .fetch_all(pool)
        .await?;

        Self::attach_steps(pool, cases).await
    }

    async fn attach_steps(
        pool: &PgPool,
        cases: Vec<TestCase>,
    ) -> Result<Vec<TestCaseWithSteps>, sqlx::Error> {
        let ids: Vec<Uuid> = cases.iter().map(|c| c.id).collect();

        let steps = sqlx::query_as::<_, TestStep>(&format!(
            "SELECT {STEP_COLUMNS} FROM test_steps WHERE test_case_id = ANY($1) ORDER BY test_case_id, step_number"
        ))
        .bind(&ids)
        .fetch_all(pool)
        .await?;

        let mut by_case: HashMap<Uuid, Vec<TestStep>> = HashMap::new();
        for step in steps {
            by_case.entry(step.test_case_id).or_default().push(step);
        }

        Ok(cases
            .into_iter()
            .map(|test_case| {
                let steps = by_case.remove(&test_case.id).unwrap_or_default();
                TestCaseWithSteps { test_case, steps }
            })
            .collect())
    }

    /// Returns the steps of a test case in order
    pub async fn steps(pool: &PgPool, test_case_id: Uuid) -> Result<Vec<TestStep>, sqlx::Error> {
        sqlx::query_as::<_, TestStep>(&format!(
            "SELECT {STEP_COLUMNS} FROM test_steps WHERE test_case_id = $1 ORDER BY step_number"
        ))
        .bind(test_case_id)
        .fetch_all(pool)
        .await
    }

    /// Holds the module row until the transaction ends
    ///
    /// `NO KEY UPDATE` still lets suites be created under the module.
    async fn lock_module(conn: &mut PgConnection, module_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT id FROM test_modules WHERE id = $1 FOR NO KEY UPDATE")
            .bind(module_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(())
    }

    /// Whether `case_id` is already used by another case in the module
    ///
    /// `exclude` skips the case being updated. Locks the module, so call it
    /// inside the transaction that writes the case.
    pub async fn case_id_taken(
        conn: &mut PgConnection,
        module_id: Uuid,
        case_id: &str,
        exclude: Option<Uuid>,
    ) -> Result<bool, sqlx::Error> {
        Self::lock_module(&mut *conn, module_id).await?;

        sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1
                FROM test_cases c
                JOIN test_suites s ON s.id = c.suite_id
                WHERE s.module_id = $1
                  AND c.case_id = $2
                  AND ($3::uuid IS NULL OR c.id <> $3)
            )
            "#,
        )
        .bind(module_id)
        .bind(case_id.trim())
        .bind(exclude)
        .fetch_one(conn)
        .await
    }

    /// Returns every case ID used in a module, locking the module like
    /// `case_id_taken`
    pub async fn case_ids_in_module(
        conn: &mut PgConnection,
        module_id: Uuid,
    ) -> Result<HashSet<String>, sqlx::Error> {
        Self::lock_module(&mut *conn, module_id).await?;

        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT c.case_id
            FROM test_cases c
            JOIN test_suites s ON s.id = c.suite_id
            WHERE s.module_id = $1
            "#,
        )
        .bind(module_id)
        .fetch_all(conn)
        .await?;

        Ok(ids.into_iter().collect())
    }

    /// Updates a test case and optionally replaces its steps
    ///
    /// Returns None if the case doesn't exist.
    pub async fn update(
        conn: &mut PgConnection,
        id: Uuid,
        data: UpdateTestCase,
    ) -> Result<Option<TestCaseWithSteps>, sqlx::Error> {
        let mut query = String::from("UPDATE test_cases SET updated_at = NOW()");
        let mut bind_count = 1;

        if data.case_id.is_some() {
            bind_count += 1;
            query.push_str(&format!(", case_id = ${}", bind_count));
        }
        if data.title.is_some() {
            bind_count += 1;
            query.push_str(&format!(", title = ${}", bind_count));
        }
        if data.description.is_some() {
            bind_count += 1;
            query.push_str(&format!(", description = ${}", bind_count));
        }
        if data.priority.is_some() {
            bind_count += 1;
            query.push_str(&format!(", priority = ${}", bind_count));
        }

        query.push_str(&format!(" WHERE id = $1 RETURNING {CASE_COLUMNS}"));

        let mut q = sqlx::query_as::<_, TestCase>(&query).bind(id);

        if let Some(case_id) = data.case_id {
            q = q.bind(case_id.trim().to_string());
        }
        if let Some(title) = data.title {
            q = q.bind(title.trim().to_string());
        }
        if let Some(description) = data.description {
            q = q.bind(description);
        }
        if let Some(priority) = data.priority {
            q = q.bind(priority);
        }

        let Some(test_case) = q.fetch_optional(&mut *conn).await? else {
            return Ok(None);
        };

        let steps = match data.steps {
            Some(steps) => Self::replace_steps(&mut *conn, id, &steps).await?,
            None => {
                sqlx::query_as::<_, TestStep>(&format!(
                    "SELECT {STEP_COLUMNS} FROM test_steps WHERE test_case_id = $1 ORDER BY step_number"
                ))
                .bind(id)
                .fetch_all(&mut *conn)
                .await?
            }
        };

        Ok(Some(TestCaseWithSteps { test_case, steps }))
    }

    /// Writes `steps` as steps 1..N of a test case
    ///
    /// Existing step rows keep their IDs (and therefore their execution
    /// results) when their position survives; steps past the new length are
    /// deleted.
    pub async fn replace_steps(
        conn: &mut PgConnection,
        test_case_id: Uuid,
        steps: &[StepInput],
    ) -> Result<Vec<TestStep>, sqlx::Error> {
        let mut written = Vec::with_capacity(steps.len());

        for (index, step) in steps.iter().enumerate() {
            let row = sqlx::query_as::<_, TestStep>(&format!(
                r#"
                INSERT INTO test_steps (test_case_id, step_number, action, expected_result)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (test_case_id, step_number)
                DO UPDATE SET action = EXCLUDED.action, expected_result = EXCLUDED.expected_result
                RETURNING {STEP_COLUMNS}
                "#
            ))
            .bind(test_case_id)
            .bind(step_number(index))
            .bind(step.action.trim())
            .bind(step.expected_result.as_deref().map(str::trim).filter(|s| !s.is_empty()))
            .fetch_one(&mut *conn)
            .await?;

            written.push(row);
        }

        sqlx::query("DELETE FROM test_steps WHERE test_case_id = $1 AND step_number > $2")
            .bind(test_case_id)
            .bind(step_number(steps.len()) - 1)
            .execute(&mut *conn)
            .await?;

        Ok(written)
    }
}

/// Step number for the step at a zero-based position
pub fn step_number(index: usize) -> i32 {
    i32::try_from(index).map_or(i32::MAX, |i| i.saturating_add(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_default_is_medium() {
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!(Priority::parse("high"), Some(Priority::High));
        assert_eq!(Priority::parse(" Critical "), Some(Priority::Critical));
        assert_eq!(Priority::parse("urgent"), None);
        assert_eq!(Priority::parse(""), None);
    }

    #[test]
    fn test_step_number_is_one_based() {
        assert_eq!(step_number(0), 1);
        assert_eq!(step_number(4), 5);
    }

    #[test]
    fn test_case_with_steps_serializes_flat() {
        let id = Uuid::new_v4();
        let case = TestCaseWithSteps {
            test_case: TestCase {
                id,
                suite_id: Uuid::new_v4(),
                case_id: "LOGIN-001".to_string(),
                title: "Valid login".to_string(),
                description: None,
                priority: Priority::High,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            steps: vec![TestStep {
                id: Uuid::new_v4(),
                test_case_id: id,
                step_number: 1,
                action: "Open the login page".to_string(),
                expected_result: Some("Form is shown".to_string()),
            }],
        };

        let json = serde_json::to_value(&case).unwrap();
        assert_eq!(json["case_id"], "LOGIN-001");
        assert_eq!(json["priority"], "HIGH");
        assert_eq!(json["steps"][0]["step_number"], 1);
    }
}
