/// Test execution and step result models
///
/// An execution is one recorded run of a test case. Creating it snapshots the
/// case's current steps as one PENDING step result each; testers then record
/// a status and the observed behaviour per step. The overall result is derived
/// from the step statuses unless the caller sets it explicitly.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE execution_result AS ENUM ('PENDING', 'PASSED', 'FAILED', 'BLOCKED', 'PARTIALLY_PASSED');
/// CREATE TYPE step_status AS ENUM ('PENDING', 'PASSED', 'FAILED', 'BLOCKED', 'SKIPPED');
///
/// CREATE TABLE test_executions (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     test_case_id UUID NOT NULL REFERENCES test_cases(id) ON DELETE CASCADE,
///     executed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     result execution_result NOT NULL DEFAULT 'PENDING',
///     notes TEXT,
///     assigned_to UUID REFERENCES users(id) ON DELETE SET NULL,
///     created_by UUID REFERENCES users(id) ON DELETE SET NULL,
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE TABLE test_step_results (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     execution_id UUID NOT NULL REFERENCES test_executions(id) ON DELETE CASCADE,
///     step_id UUID NOT NULL REFERENCES test_steps(id) ON DELETE CASCADE,
///     status step_status NOT NULL DEFAULT 'PENDING',
///     actual_result TEXT,
///     CONSTRAINT test_step_results_execution_step_key UNIQUE (execution_id, step_id)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::test_module::ModuleScope;

/// Overall outcome of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "execution_result", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionResult {
    #[default]
    Pending,
    Passed,
    Failed,
    Blocked,
    PartiallyPassed,
}

impl ExecutionResult {
    pub const ALL: [ExecutionResult; 5] = [
        ExecutionResult::Pending,
        ExecutionResult::Passed,
        ExecutionResult::Failed,
        ExecutionResult::Blocked,
        ExecutionResult::PartiallyPassed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionResult::Pending => "PENDING",
            ExecutionResult::Passed => "PASSED",
            ExecutionResult::Failed => "FAILED",
            ExecutionResult::Blocked => "BLOCKED",
            ExecutionResult::PartiallyPassed => "PARTIALLY_PASSED",
        }
    }
}

/// Outcome of a single step within an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "step_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum StepStatus {
    #[default]
    Pending,
    Passed,
    Failed,
    Blocked,
    Skipped,
}

/// Derives the overall result of an execution from its step statuses
///
/// Rules, first match wins:
///
/// 1. no steps, or any step still PENDING: `Pending`
/// 2. no FAILED or BLOCKED step and at least one PASSED (SKIPPED steps count
///    as passed): `Passed`
/// 3. every step FAILED: `Failed`
/// 4. FAILED steps alongside PASSED steps: `PartiallyPassed`
/// 5. any FAILED step: `Failed`
/// 6. any BLOCKED step: `Blocked`
/// 7. only SKIPPED steps: `Pending`
pub fn derive_result(statuses: &[StepStatus]) -> ExecutionResult {
    if statuses.is_empty() || statuses.contains(&StepStatus::Pending) {
        return ExecutionResult::Pending;
    }

    let count = |status: StepStatus| statuses.iter().filter(|s| **s == status).count();
    let passed = count(StepStatus::Passed);
    let failed = count(StepStatus::Failed);
    let blocked = count(StepStatus::Blocked);

    if failed == 0 && blocked == 0 && passed > 0 {
        ExecutionResult::Passed
    } else if failed == statuses.len() {
        ExecutionResult::Failed
    } else if failed > 0 && passed > 0 {
        ExecutionResult::PartiallyPassed
    } else if failed > 0 {
        ExecutionResult::Failed
    } else if blocked > 0 {
        ExecutionResult::Blocked
    } else {
        ExecutionResult::Pending
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TestExecution {
    pub id: Uuid,

    pub test_case_id: Uuid,

    pub executed_at: DateTime<Utc>,

    pub result: ExecutionResult,

    pub notes: Option<String>,

    pub assigned_to: Option<Uuid>,

    pub created_by: Option<Uuid>,

    pub updated_at: DateTime<Utc>,
}

/// A step result joined with the step it records
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StepResult {
    pub id: Uuid,

    pub step_id: Uuid,

    pub step_number: i32,

    pub action: String,

    pub expected_result: Option<String>,

    pub status: StepStatus,

    pub actual_result: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionWithResults {
    #[serde(flatten)]
    pub execution: TestExecution,

    pub step_results: Vec<StepResult>,
}

/// An execution assigned to a user, with enough context to find the case
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AssignedExecution {
    pub id: Uuid,
    pub test_case_id: Uuid,
    pub case_id: String,
    pub title: String,
    pub suite_id: Uuid,
    pub module_id: Uuid,
    pub project_id: Uuid,
    pub result: ExecutionResult,
    pub executed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateExecution {
    pub test_case_id: Uuid,
    pub notes: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub created_by: Option<Uuid>,
}

/// Recorded outcome of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_id: Uuid,

    pub status: StepStatus,

    #[serde(default)]
    pub actual_result: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateExecution {
    pub notes: Option<Option<String>>,

    pub step_results: Vec<StepOutcome>,

    /// Overrides the derived result
    pub result: Option<ExecutionResult>,
}

const EXECUTION_COLUMNS: &str =
    "id, test_case_id, executed_at, result, notes, assigned_to, created_by, updated_at";

impl TestExecution {
    /// Creates an execution with one PENDING result per current step
    pub async fn create(
        conn: &mut PgConnection,
        data: CreateExecution,
    ) -> Result<ExecutionWithResults, sqlx::Error> {
        let execution = sqlx::query_as::<_, TestExecution>(&format!(
            r#"
            INSERT INTO test_executions (test_case_id, notes, assigned_to, created_by)
            VALUES ($1, $2, $3, $4)
            RETURNING {EXECUTION_COLUMNS}
            "#
        ))
        .bind(data.test_case_id)
        .bind(data.notes)
        .bind(data.assigned_to)
        .bind(data.created_by)
        .fetch_one(&mut *conn)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO test_step_results (execution_id, step_id)
            SELECT $1, id FROM test_steps WHERE test_case_id = $2
            "#,
        )
        .bind(execution.id)
        .bind(data.test_case_id)
        .execute(&mut *conn)
        .await?;

        let step_results = Self::step_results(&mut *conn, execution.id).await?;

        Ok(ExecutionWithResults {
            execution,
            step_results,
        })
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TestExecution>(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM test_executions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Loads an execution with its step results ordered by step number
    pub async fn find_with_results(
        pool: &PgPool,
        id: Uuid,
    ) -> Result<Option<ExecutionWithResults>, sqlx::Error> {
        let Some(execution) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };

        let mut conn = pool.acquire().await?;
        let step_results = Self::step_results(&mut *conn, id).await?;

        Ok(Some(ExecutionWithResults {
            execution,
            step_results,
        }))
    }

    /// Resolves the module, project and organization of an execution
    pub async fn scope(pool: &PgPool, id: Uuid) -> Result<Option<ModuleScope>, sqlx::Error> {
        sqlx::query_as::<_, ModuleScope>(
            r#"
            SELECT s.module_id, m.project_id, p.organization_id
            FROM test_executions e
            JOIN test_cases c ON c.id = e.test_case_id
            JOIN test_suites s ON s.id = c.suite_id
            JOIN test_modules m ON m.id = s.module_id
            JOIN projects p ON p.id = m.project_id
            WHERE e.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Lists the executions of a test case, newest first
    pub async fn list_by_test_case(pool: &PgPool, test_case_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, TestExecution>(&format!(
            r#"
            SELECT {EXECUTION_COLUMNS}
            FROM test_executions
            WHERE test_case_id = $1
            ORDER BY executed_at DESC
            "#
        ))
        .bind(test_case_id)
        .fetch_all(pool)
        .await
    }

    /// Lists executions assigned to a user within their organization
    pub async fn list_assigned(
        pool: &PgPool,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<Vec<AssignedExecution>, sqlx::Error> {
        sqlx::query_as::<_, AssignedExecution>(
            r#"
            SELECT e.id, e.test_case_id, c.case_id, c.title, c.suite_id, s.module_id,
                   m.project_id, e.result, e.executed_at, e.updated_at
            FROM test_executions e
            JOIN test_cases c ON c.id = e.test_case_id
            JOIN test_suites s ON s.id = c.suite_id
            JOIN test_modules m ON m.id = s.module_id
            JOIN projects p ON p.id = m.project_id
            WHERE e.assigned_to = $1 AND p.organization_id = $2
            ORDER BY e.updated_at DESC
            "#,
        )
        .bind(user_id)
        .bind(organization_id)
        .fetch_all(pool)
        .await
    }

    async fn step_results(conn: &mut PgConnection, execution_id: Uuid) -> Result<Vec<StepResult>, sqlx::Error> {
        sqlx::query_as::<_, StepResult>(
            r#"
            SELECT r.id, r.step_id, s.step_number, s.action, s.expected_result,
                   r.status, r.actual_result
            FROM test_step_results r
            JOIN test_steps s ON s.id = r.step_id
            WHERE r.execution_id = $1
            ORDER BY s.step_number
            "#,
        )
        .bind(execution_id)
        .fetch_all(conn)
        .await
    }

    /// Records step outcomes and recomputes the overall result
    ///
    /// Outcomes for steps that aren't part of the execution are ignored;
    /// callers validate step IDs against `find_with_results` first. Returns
    /// None if the execution doesn't exist.
    pub async fn update(
        conn: &mut PgConnection,
        id: Uuid,
        data: UpdateExecution,
    ) -> Result<Option<ExecutionWithResults>, sqlx::Error> {
        for outcome in &data.step_results {
            sqlx::query(
                r#"
                UPDATE test_step_results
                SET status = $3, actual_result = $4
                WHERE execution_id = $1 AND step_id = $2
                "#,
            )
            .bind(id)
            .bind(outcome.step_id)
            .bind(outcome.status)
            .bind(outcome.actual_result.as_deref())
            .execute(&mut *conn)
            .await?;
        }

        let step_results = Self::step_results(&mut *conn, id).await?;
        let result = data.result.unwrap_or_else(|| {
            let statuses: Vec<StepStatus> = step_results.iter().map(|r| r.status).collect();
            derive_result(&statuses)
        });

        let mut query = String::from("UPDATE test_executions SET updated_at = NOW(), result = $2");
        if data.notes.is_some() {
            query.push_str(", notes = $3");
        }
        query.push_str(&format!(" WHERE id = $1 RETURNING {EXECUTION_COLUMNS}"));

        let mut q = sqlx::query_as::<_, TestExecution>(&query).bind(id).bind(result);
        if let Some(notes) = data.notes {
            q = q.bind(notes);
        }

        let Some(execution) = q.fetch_optional(&mut *conn).await? else {
            return Ok(None);
        };

        Ok(Some(ExecutionWithResults {
            execution,
            step_results,
        }))
    }

    /// Sets or clears the assignee of an execution
    pub async fn assign(
        pool: &PgPool,
        id: Uuid,
        assigned_to: Option<Uuid>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TestExecution>(&format!(
            r#"
            UPDATE test_executions
            SET assigned_to = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {EXECUTION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(assigned_to)
        .fetch_optional(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use StepStatus::*;

    #[test]
    fn test_no_steps_is_pending() {
        assert_eq!(derive_result(&[]), ExecutionResult::Pending);
    }

    #[test]
    fn test_any_pending_step_is_pending() {
        assert_eq!(derive_result(&[Passed, Pending, Failed]), ExecutionResult::Pending);
    }

    #[test]
    fn test_all_passed() {
        assert_eq!(derive_result(&[Passed, Passed]), ExecutionResult::Passed);
    }

    #[test]
    fn test_skipped_counts_as_passed() {
        assert_eq!(derive_result(&[Passed, Skipped]), ExecutionResult::Passed);
    }

    #[test]
    fn test_all_failed() {
        assert_eq!(derive_result(&[Failed, Failed]), ExecutionResult::Failed);
    }

    #[test]
    fn test_failed_with_passed_is_partial() {
        assert_eq!(derive_result(&[Passed, Failed]), ExecutionResult::PartiallyPassed);
        assert_eq!(derive_result(&[Passed, Failed, Blocked]), ExecutionResult::PartiallyPassed);
    }

    #[test]
    fn test_failed_without_passed() {
        assert_eq!(derive_result(&[Failed, Blocked]), ExecutionResult::Failed);
        assert_eq!(derive_result(&[Failed, Skipped]), ExecutionResult::Failed);
    }

    #[test]
    fn test_blocked() {
        assert_eq!(derive_result(&[Passed, Blocked]), ExecutionResult::Blocked);
        assert_eq!(derive_result(&[Blocked]), ExecutionResult::Blocked);
    }

    #[test]
    fn test_only_skipped_is_pending() {
        assert_eq!(derive_result(&[Skipped, Skipped]), ExecutionResult::Pending);
    }

    #[test]
    fn test_result_serde_names() {
        let json = serde_json::to_string(&ExecutionResult::PartiallyPassed).unwrap();
        assert_eq!(json, r#""PARTIALLY_PASSED""#);
        assert_eq!(ExecutionResult::PartiallyPassed.as_str(), "PARTIALLY_PASSED");

        let status: StepStatus = serde_json::from_str(r#""SKIPPED""#).unwrap();
        assert_eq!(status, Skipped);
    }
}
