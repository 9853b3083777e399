/// Transactional subtree deletion
///
/// Deleting a node removes everything below it, bottom-up, in one
/// transaction: step results, executions, steps, test cases, suites, modules,
/// then the node itself. The foreign keys also cascade, but draining
/// explicitly lets the caller report what was removed and keeps the delete
/// independent of how the constraints are declared.
///
/// # Example
///
/// ```no_run
/// use tcm_shared::models::cascade::{delete_subtree, DeleteScope};
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, module_id: Uuid) -> Result<(), sqlx::Error> {
/// if let Some(summary) = delete_subtree(&pool, DeleteScope::Module(module_id)).await? {
///     println!("removed {} test cases", summary.test_cases);
/// }
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

/// Root of a subtree to delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteScope {
    Project(Uuid),
    Module(Uuid),
    Suite(Uuid),
    TestCase(Uuid),
    Execution(Uuid),
}

impl DeleteScope {
    fn id(&self) -> Uuid {
        match self {
            DeleteScope::Project(id)
            | DeleteScope::Module(id)
            | DeleteScope::Suite(id)
            | DeleteScope::TestCase(id)
            | DeleteScope::Execution(id) => *id,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            DeleteScope::Project(_) => "project",
            DeleteScope::Module(_) => "module",
            DeleteScope::Suite(_) => "suite",
            DeleteScope::TestCase(_) => "test_case",
            DeleteScope::Execution(_) => "execution",
        }
    }

    /// Subquery selecting the IDs of every test case in the subtree
    fn test_case_ids(&self) -> Option<&'static str> {
        match self {
            DeleteScope::Project(_) => Some(
                "SELECT c.id FROM test_cases c \
                 JOIN test_suites s ON s.id = c.suite_id \
                 JOIN test_modules m ON m.id = s.module_id \
                 WHERE m.project_id = $1",
            ),
            DeleteScope::Module(_) => Some(
                "SELECT c.id FROM test_cases c \
                 JOIN test_suites s ON s.id = c.suite_id \
                 WHERE s.module_id = $1",
            ),
            DeleteScope::Suite(_) => Some("SELECT id FROM test_cases WHERE suite_id = $1"),
            DeleteScope::TestCase(_) => Some("SELECT $1::uuid"),
            DeleteScope::Execution(_) => None,
        }
    }
}

/// Number of rows removed at each level of the hierarchy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSummary {
    pub projects: u64,
    pub modules: u64,
    pub suites: u64,
    pub test_cases: u64,
    pub steps: u64,
    pub executions: u64,
    pub step_results: u64,
}

impl DeleteSummary {
    pub fn total(&self) -> u64 {
        self.projects
            + self.modules
            + self.suites
            + self.test_cases
            + self.steps
            + self.executions
            + self.step_results
    }
}

/// Deletes a node and its subtree in one transaction
///
/// Returns None (and changes nothing) if the root doesn't exist.
pub async fn delete_subtree(pool: &PgPool, scope: DeleteScope) -> Result<Option<DeleteSummary>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let summary = drain(&mut *tx, scope).await?;

    if summary.is_none() {
        tx.rollback().await?;
        return Ok(None);
    }

    tx.commit().await?;

    if let Some(summary) = &summary {
        info!(
            kind = scope.kind(),
            id = %scope.id(),
            rows = summary.total(),
            "Deleted subtree"
        );
    }

    Ok(summary)
}

async fn drain(conn: &mut PgConnection, scope: DeleteScope) -> Result<Option<DeleteSummary>, sqlx::Error> {
    let id = scope.id();
    let mut summary = DeleteSummary::default();

    if let DeleteScope::Execution(_) = scope {
        summary.step_results = execute(&mut *conn, "DELETE FROM test_step_results WHERE execution_id = $1", id).await?;
        summary.executions = execute(&mut *conn, "DELETE FROM test_executions WHERE id = $1", id).await?;

        return Ok((summary.executions > 0).then_some(summary));
    }

    if let Some(cases) = scope.test_case_ids() {
        summary.step_results = execute(
            &mut *conn,
            &format!(
                "DELETE FROM test_step_results WHERE execution_id IN \
                 (SELECT id FROM test_executions WHERE test_case_id IN ({cases}))"
            ),
            id,
        )
        .await?;
        summary.executions = execute(
            &mut *conn,
            &format!("DELETE FROM test_executions WHERE test_case_id IN ({cases})"),
            id,
        )
        .await?;
        summary.steps = execute(
            &mut *conn,
            &format!("DELETE FROM test_steps WHERE test_case_id IN ({cases})"),
            id,
        )
        .await?;
        summary.test_cases = execute(
            &mut *conn,
            &format!("DELETE FROM test_cases WHERE id IN ({cases})"),
            id,
        )
        .await?;
    }

    let root_deleted = match scope {
        DeleteScope::TestCase(_) => summary.test_cases,
        DeleteScope::Suite(_) => {
            summary.suites = execute(&mut *conn, "DELETE FROM test_suites WHERE id = $1", id).await?;
            summary.suites
        }
        DeleteScope::Module(_) => {
            summary.suites = execute(&mut *conn, "DELETE FROM test_suites WHERE module_id = $1", id).await?;
            summary.modules = execute(&mut *conn, "DELETE FROM test_modules WHERE id = $1", id).await?;
            summary.modules
        }
        DeleteScope::Project(_) => {
            summary.suites = execute(
                &mut *conn,
                "DELETE FROM test_suites WHERE module_id IN (SELECT id FROM test_modules WHERE project_id = $1)",
                id,
            )
            .await?;
            summary.modules = execute(&mut *conn, "DELETE FROM test_modules WHERE project_id = $1", id).await?;
            summary.projects = execute(&mut *conn, "DELETE FROM projects WHERE id = $1", id).await?;
            summary.projects
        }
        DeleteScope::Execution(_) => 0,
    };

    Ok((root_deleted > 0).then_some(summary))
}

async fn execute(conn: &mut PgConnection, sql: &str, id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(sql).bind(id).execute(conn).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_total() {
        let summary = DeleteSummary {
            projects: 1,
            modules: 2,
            suites: 3,
            test_cases: 4,
            steps: 10,
            executions: 5,
            step_results: 20,
        };
        assert_eq!(summary.total(), 45);
        assert_eq!(DeleteSummary::default().total(), 0);
    }

    #[test]
    fn test_execution_scope_has_no_case_subquery() {
        let id = Uuid::new_v4();
        assert!(DeleteScope::Execution(id).test_case_ids().is_none());
        assert!(DeleteScope::TestCase(id).test_case_ids().is_some());
        assert_eq!(DeleteScope::Suite(id).id(), id);
    }
}
