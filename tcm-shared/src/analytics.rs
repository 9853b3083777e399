/// Pass/fail analytics for projects and modules
///
/// One row is loaded per test case, carrying the result of its most recent
/// execution and how many executions it has. Everything else is aggregated in
/// memory by [`summarize`], grouped by module (project view) or by suite
/// (module view).
///
/// A case counts as executed when its latest execution is not `PENDING`. The
/// pass rate is the percentage of executed cases whose latest result is
/// `PASSED`, rounded to two decimals.

use serde::Serialize;
use sqlx::PgPool;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::execution::ExecutionResult;

/// Latest state of one test case, as loaded for aggregation
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CaseOutcome {
    pub test_case_id: Uuid,

    /// Module or suite the case is grouped under
    pub group_id: Uuid,

    pub group_name: String,

    /// Result of the most recent execution, None when never executed
    pub latest_result: Option<ExecutionResult>,

    pub execution_count: i64,
}

/// Cases per latest result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResultCounts {
    pub passed: u64,
    pub failed: u64,
    pub blocked: u64,
    pub partially_passed: u64,
    pub pending: u64,
}

impl ResultCounts {
    fn record(&mut self, result: ExecutionResult) {
        match result {
            ExecutionResult::Passed => self.passed += 1,
            ExecutionResult::Failed => self.failed += 1,
            ExecutionResult::Blocked => self.blocked += 1,
            ExecutionResult::PartiallyPassed => self.partially_passed += 1,
            ExecutionResult::Pending => self.pending += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub total_cases: u64,

    /// Cases whose latest execution has a final result
    pub executed_cases: u64,

    /// Cases never executed or with only a pending latest execution
    pub not_run_cases: u64,

    pub results: ResultCounts,

    /// Percentage of executed cases that passed, 0 when nothing was executed
    pub pass_rate: f64,

    /// All executions, not only the latest per case
    pub execution_count: u64,
}

impl Summary {
    fn add(&mut self, outcome: &CaseOutcome) {
        self.total_cases += 1;
        self.execution_count += u64::try_from(outcome.execution_count).unwrap_or(0);

        if let Some(result) = outcome.latest_result {
            self.results.record(result);
        }

        match outcome.latest_result {
            Some(result) if result != ExecutionResult::Pending => self.executed_cases += 1,
            _ => self.not_run_cases += 1,
        }
    }

    fn finish(mut self) -> Self {
        self.pass_rate = pass_rate(self.results.passed, self.executed_cases);
        self
    }
}

/// Percentage with two decimals
pub fn pass_rate(passed: u64, executed: u64) -> f64 {
    if executed == 0 {
        return 0.0;
    }

    let rate = passed as f64 * 100.0 / executed as f64;
    (rate * 100.0).round() / 100.0
}

/// Summary of one module or suite
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub id: Uuid,

    pub name: String,

    #[serde(flatten)]
    pub summary: Summary,
}

/// Overall summary plus one entry per group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Breakdown {
    #[serde(flatten)]
    pub summary: Summary,

    pub groups: Vec<GroupSummary>,
}

/// Aggregates case outcomes
///
/// `groups` lists every group that must appear, including empty ones, in
/// display order.
pub fn summarize(groups: &[(Uuid, String)], outcomes: &[CaseOutcome]) -> Breakdown {
    let mut total = Summary::default();
    let mut per_group: BTreeMap<Uuid, Summary> = BTreeMap::new();

    for outcome in outcomes {
        total.add(outcome);
        per_group.entry(outcome.group_id).or_default().add(outcome);
    }

    let groups = groups
        .iter()
        .map(|(id, name)| GroupSummary {
            id: *id,
            name: name.clone(),
            summary: per_group.remove(id).unwrap_or_default().finish(),
        })
        .collect();

    Breakdown {
        summary: total.finish(),
        groups,
    }
}

/// Latest execution per case, picked by `executed_at` then insertion order
const LATEST_EXECUTION: &str = r#"
    LEFT JOIN LATERAL (
        SELECT e.result
        FROM test_executions e
        WHERE e.test_case_id = c.id
        ORDER BY e.executed_at DESC, e.updated_at DESC
        LIMIT 1
    ) latest ON TRUE
"#;

const EXECUTION_COUNT: &str =
    "(SELECT COUNT(*) FROM test_executions e WHERE e.test_case_id = c.id) AS execution_count";

#[derive(Debug, Clone, Serialize)]
pub struct ProjectAnalytics {
    pub project_id: Uuid,

    #[serde(flatten)]
    pub summary: Summary,

    pub modules: Vec<GroupSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleAnalytics {
    pub module_id: Uuid,

    #[serde(flatten)]
    pub summary: Summary,

    pub suites: Vec<GroupSummary>,
}

/// Modules of the project that `$2` may see; a NULL viewer sees all of them
const VISIBLE_MODULE: &str = r#"
    ($2::uuid IS NULL
     OR EXISTS (SELECT 1 FROM project_users pu WHERE pu.project_id = m.project_id AND pu.user_id = $2)
     OR EXISTS (SELECT 1 FROM module_users mu WHERE mu.module_id = m.id AND mu.user_id = $2))
"#;

/// Analytics of a project, broken down by module
///
/// With a `viewer`, only modules visible to that user are counted, the same
/// set `TestModule::list_visible_to` returns. Pass None for admins.
pub async fn project_analytics(
    pool: &PgPool,
    project_id: Uuid,
    viewer: Option<Uuid>,
) -> Result<ProjectAnalytics, sqlx::Error> {
    let groups: Vec<(Uuid, String)> = sqlx::query_as(&format!(
        "SELECT m.id, m.name FROM test_modules m WHERE m.project_id = $1 AND {VISIBLE_MODULE} ORDER BY m.name ASC"
    ))
    .bind(project_id)
    .bind(viewer)
    .fetch_all(pool)
    .await?;

    let outcomes = sqlx::query_as::<_, CaseOutcome>(&format!(
        r#"
        SELECT c.id AS test_case_id, m.id AS group_id, m.name AS group_name,
               latest.result AS latest_result, {EXECUTION_COUNT}
        FROM test_cases c
        JOIN test_suites s ON s.id = c.suite_id
        JOIN test_modules m ON m.id = s.module_id
        {LATEST_EXECUTION}
        WHERE m.project_id = $1 AND {VISIBLE_MODULE}
        "#
    ))
    .bind(project_id)
    .bind(viewer)
    .fetch_all(pool)
    .await?;

    let breakdown = summarize(&groups, &outcomes);

    Ok(ProjectAnalytics {
        project_id,
        summary: breakdown.summary,
        modules: breakdown.groups,
    })
}

/// Analytics of a module, broken down by suite
pub async fn module_analytics(pool: &PgPool, module_id: Uuid) -> Result<ModuleAnalytics, sqlx::Error> {
    let groups: Vec<(Uuid, String)> =
        sqlx::query_as("SELECT id, name FROM test_suites WHERE module_id = $1 ORDER BY name ASC")
            .bind(module_id)
            .fetch_all(pool)
            .await?;

    let outcomes = sqlx::query_as::<_, CaseOutcome>(&format!(
        r#"
        SELECT c.id AS test_case_id, s.id AS group_id, s.name AS group_name,
               latest.result AS latest_result, {EXECUTION_COUNT}
        FROM test_cases c
        JOIN test_suites s ON s.id = c.suite_id
        {LATEST_EXECUTION}
        WHERE s.module_id = $1
        "#
    ))
    .bind(module_id)
    .fetch_all(pool)
    .await?;

    let breakdown = summarize(&groups, &outcomes);

    Ok(ModuleAnalytics {
        module_id,
        summary: breakdown.summary,
        suites: breakdown.groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(group_id: Uuid, latest: Option<ExecutionResult>, executions: i64) -> CaseOutcome {
        CaseOutcome {
            test_case_id: Uuid::new_v4(),
            group_id,
            group_name: String::new(),
            latest_result: latest,
            execution_count: executions,
        }
    }

    #[test]
    fn test_pass_rate_rounding() {
        assert_eq!(pass_rate(0, 0), 0.0);
        assert_eq!(pass_rate(1, 1), 100.0);
        assert_eq!(pass_rate(2, 3), 66.67);
        assert_eq!(pass_rate(1, 3), 33.33);
    }

    #[test]
    fn test_summarize_counts_latest_results() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let empty = Uuid::new_v4();

        let outcomes = vec![
            outcome(a, Some(ExecutionResult::Passed), 3),
            outcome(a, Some(ExecutionResult::Failed), 1),
            outcome(a, None, 0),
            outcome(b, Some(ExecutionResult::Pending), 1),
            outcome(b, Some(ExecutionResult::PartiallyPassed), 2),
        ];

        let groups = vec![
            (a, "Auth".to_string()),
            (b, "Billing".to_string()),
            (empty, "Empty".to_string()),
        ];

        let breakdown = summarize(&groups, &outcomes);
        let total = &breakdown.summary;

        assert_eq!(total.total_cases, 5);
        assert_eq!(total.executed_cases, 3);
        assert_eq!(total.not_run_cases, 2);
        assert_eq!(total.execution_count, 7);
        assert_eq!(total.results.passed, 1);
        assert_eq!(total.results.failed, 1);
        assert_eq!(total.results.partially_passed, 1);
        assert_eq!(total.results.pending, 1);
        assert_eq!(total.pass_rate, 33.33);

        assert_eq!(breakdown.groups.len(), 3);
        assert_eq!(breakdown.groups[0].name, "Auth");
        assert_eq!(breakdown.groups[0].summary.total_cases, 3);
        assert_eq!(breakdown.groups[0].summary.pass_rate, 50.0);
        assert_eq!(breakdown.groups[1].summary.executed_cases, 1);
        assert_eq!(breakdown.groups[1].summary.pass_rate, 0.0);
        assert_eq!(breakdown.groups[2].summary, Summary::default());
    }

    #[test]
    fn test_summarize_nothing() {
        let breakdown = summarize(&[], &[]);
        assert_eq!(breakdown.summary, Summary::default());
        assert!(breakdown.groups.is_empty());
    }

    #[test]
    fn test_summary_serializes_flat() {
        let group = GroupSummary {
            id: Uuid::nil(),
            name: "Suite".to_string(),
            summary: Summary::default(),
        };

        let value = serde_json::to_value(&group).unwrap();
        assert_eq!(value["name"], "Suite");
        assert_eq!(value["total_cases"], 0);
        assert_eq!(value["results"]["partially_passed"], 0);
    }
}
