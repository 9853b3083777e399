/// Execution endpoints
///
/// An execution is one run of a test case. It starts with a PENDING result per
/// step; the overall result is derived from the step outcomes unless the
/// tester sets it explicitly.

use std::collections::HashSet;

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{double_option, optional_text, ApiJson, OptionalJson},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tcm_shared::{
    auth::{
        authorization::{
            require_execution_access, require_organization_members, require_permission, require_test_case_access,
            Permission,
        },
        middleware::AuthContext,
    },
    models::{
        cascade::{delete_subtree, DeleteScope, DeleteSummary},
        execution::{
            AssignedExecution, CreateExecution, ExecutionResult, ExecutionWithResults, StepOutcome, TestExecution,
            UpdateExecution,
        },
    },
};
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct CreateExecutionRequest {
    pub notes: Option<String>,

    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateExecutionRequest {
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,

    #[serde(default)]
    pub step_results: Vec<StepOutcome>,

    /// Explicit overall result; derived from the steps when absent
    pub result: Option<ExecutionResult>,
}

/// `{"user_id": null}` unassigns
#[derive(Debug, Deserialize)]
pub struct AssignExecutionRequest {
    pub user_id: Option<Uuid>,
}

/// Checks that every outcome names a step of this execution, at most once
fn check_step_outcomes(execution: &ExecutionWithResults, outcomes: &[StepOutcome]) -> ApiResult<()> {
    let known: HashSet<Uuid> = execution.step_results.iter().map(|r| r.step_id).collect();
    let mut seen = HashSet::new();

    for (index, outcome) in outcomes.iter().enumerate() {
        let field = format!("step_results[{}].step_id", index);

        if !known.contains(&outcome.step_id) {
            return Err(ApiError::invalid(&field, "Step does not belong to this execution"));
        }
        if !seen.insert(outcome.step_id) {
            return Err(ApiError::invalid(&field, "Step is listed more than once"));
        }
    }

    Ok(())
}

async fn check_assignee(state: &AppState, auth: &AuthContext, user_id: Option<Uuid>) -> ApiResult<()> {
    if let Some(user_id) = user_id {
        require_organization_members(&state.db, auth.organization_id, &[user_id]).await?;
    }
    Ok(())
}

pub async fn create_execution(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(test_case_id): Path<Uuid>,
    body: OptionalJson<CreateExecutionRequest>,
) -> ApiResult<(StatusCode, Json<ExecutionWithResults>)> {
    require_permission(&auth, Permission::ExecuteTests)?;
    require_test_case_access(&state.db, &auth, test_case_id).await?;

    let req = body.or_default();
    check_assignee(&state, &auth, req.assigned_to).await?;

    let mut tx = state.db.begin().await?;
    let execution = TestExecution::create(
        &mut *tx,
        CreateExecution {
            test_case_id,
            notes: optional_text(req.notes),
            assigned_to: req.assigned_to,
            created_by: Some(auth.user_id),
        },
    )
    .await?;
    tx.commit().await?;

    tracing::info!(
        execution_id = %execution.execution.id,
        test_case_id = %test_case_id,
        steps = execution.step_results.len(),
        "Execution created"
    );

    Ok((StatusCode::CREATED, Json(execution)))
}

pub async fn list_executions(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(test_case_id): Path<Uuid>,
) -> ApiResult<Json<Vec<TestExecution>>> {
    require_permission(&auth, Permission::Read)?;
    require_test_case_access(&state.db, &auth, test_case_id).await?;

    Ok(Json(TestExecution::list_by_test_case(&state.db, test_case_id).await?))
}

/// Executions assigned to the caller, newest first
pub async fn list_assigned(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<Vec<AssignedExecution>>> {
    require_permission(&auth, Permission::Read)?;

    Ok(Json(
        TestExecution::list_assigned(&state.db, auth.user_id, auth.organization_id).await?,
    ))
}

pub async fn get_execution(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(execution_id): Path<Uuid>,
) -> ApiResult<Json<ExecutionWithResults>> {
    require_permission(&auth, Permission::Read)?;
    require_execution_access(&state.db, &auth, execution_id).await?;

    let execution = TestExecution::find_with_results(&state.db, execution_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Execution not found".to_string()))?;

    Ok(Json(execution))
}

/// Records step outcomes, notes and optionally an explicit result
///
/// # Errors
///
/// - `422`: A step ID doesn't belong to the execution or repeats
pub async fn update_execution(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(execution_id): Path<Uuid>,
    ApiJson(req): ApiJson<UpdateExecutionRequest>,
) -> ApiResult<Json<ExecutionWithResults>> {
    require_permission(&auth, Permission::ExecuteTests)?;
    require_execution_access(&state.db, &auth, execution_id).await?;

    let current = TestExecution::find_with_results(&state.db, execution_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Execution not found".to_string()))?;
    check_step_outcomes(&current, &req.step_results)?;

    let step_results = req
        .step_results
        .into_iter()
        .map(|outcome| StepOutcome {
            actual_result: optional_text(outcome.actual_result),
            ..outcome
        })
        .collect();

    let mut tx = state.db.begin().await?;
    let updated = TestExecution::update(
        &mut *tx,
        execution_id,
        UpdateExecution {
            notes: req.notes.map(optional_text),
            step_results,
            result: req.result,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Execution not found".to_string()))?;
    tx.commit().await?;

    tracing::info!(
        execution_id = %execution_id,
        result = updated.execution.result.as_str(),
        "Execution updated"
    );

    Ok(Json(updated))
}

pub async fn delete_execution(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(execution_id): Path<Uuid>,
) -> ApiResult<Json<DeleteSummary>> {
    require_permission(&auth, Permission::ExecuteTests)?;
    require_execution_access(&state.db, &auth, execution_id).await?;

    let summary = delete_subtree(&state.db, DeleteScope::Execution(execution_id))
        .await?
        .ok_or_else(|| ApiError::NotFound("Execution not found".to_string()))?;

    Ok(Json(summary))
}

/// Sets or clears the assignee
pub async fn assign_execution(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(execution_id): Path<Uuid>,
    ApiJson(req): ApiJson<AssignExecutionRequest>,
) -> ApiResult<Json<TestExecution>> {
    require_permission(&auth, Permission::ExecuteTests)?;
    require_execution_access(&state.db, &auth, execution_id).await?;
    check_assignee(&state, &auth, req.user_id).await?;

    let execution = TestExecution::assign(&state.db, execution_id, req.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Execution not found".to_string()))?;

    tracing::info!(
        execution_id = %execution_id,
        assigned_to = ?req.user_id,
        "Execution assignee changed"
    );

    Ok(Json(execution))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tcm_shared::models::execution::{StepResult, StepStatus};

    fn execution_with_steps(step_ids: &[Uuid]) -> ExecutionWithResults {
        let execution_id = Uuid::new_v4();
        ExecutionWithResults {
            execution: TestExecution {
                id: execution_id,
                test_case_id: Uuid::new_v4(),
                executed_at: Utc::now(),
                result: ExecutionResult::Pending,
                notes: None,
                assigned_to: None,
                created_by: None,
                updated_at: Utc::now(),
            },
            step_results: step_ids
                .iter()
                .enumerate()
                .map(|(i, step_id)| StepResult {
                    id: Uuid::new_v4(),
                    step_id: *step_id,
                    step_number: i as i32 + 1,
                    action: format!("Step {}", i + 1),
                    expected_result: None,
                    status: StepStatus::Pending,
                    actual_result: None,
                })
                .collect(),
        }
    }

    fn outcome(step_id: Uuid) -> StepOutcome {
        StepOutcome {
            step_id,
            status: StepStatus::Passed,
            actual_result: None,
        }
    }

    #[test]
    fn test_step_outcomes_must_belong_to_execution() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let execution = execution_with_steps(&[a, b]);

        assert!(check_step_outcomes(&execution, &[outcome(a), outcome(b)]).is_ok());
        assert!(check_step_outcomes(&execution, &[outcome(Uuid::new_v4())]).is_err());
        assert!(check_step_outcomes(&execution, &[outcome(a), outcome(a)]).is_err());
    }

    #[test]
    fn test_update_request_parsing() {
        let req: UpdateExecutionRequest = serde_json::from_str(
            r#"{"step_results": [{"step_id": "00000000-0000-0000-0000-000000000001", "status": "FAILED"}], "result": "BLOCKED"}"#,
        )
        .unwrap();

        assert_eq!(req.step_results[0].status, StepStatus::Failed);
        assert_eq!(req.result, Some(ExecutionResult::Blocked));
        assert_eq!(req.notes, None);
    }
}
