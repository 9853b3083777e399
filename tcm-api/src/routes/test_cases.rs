/// Test case endpoints
///
/// # Endpoints
///
/// - `POST /v1/suites/:id/test-cases` - Create with steps
/// - `GET /v1/suites/:id/test-cases` - Cases of a suite, with steps
/// - `GET /v1/test-cases/:id`
/// - `PUT /v1/test-cases/:id` - Partial update; `steps` replaces all steps
/// - `DELETE /v1/test-cases/:id`
///
/// `case_id` is unique within a module. The check locks the module row inside
/// the write transaction, so concurrent writers to one module take turns.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{double_option, optional_text, required_text, ApiJson},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tcm_shared::{
    auth::{
        authorization::{require_permission, require_suite_access, require_test_case_access, Permission},
        middleware::AuthContext,
    },
    models::{
        cascade::{delete_subtree, DeleteScope, DeleteSummary},
        test_case::{CreateTestCase, Priority, StepInput, TestCase, TestCaseWithSteps, UpdateTestCase},
    },
};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTestCaseRequest {
    #[validate(length(min = 1, max = 100, message = "Case ID must be 1-100 characters"))]
    pub case_id: String,

    #[validate(length(min = 1, max = 500, message = "Title must be 1-500 characters"))]
    pub title: String,

    pub description: Option<String>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub steps: Vec<StepInput>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTestCaseRequest {
    #[validate(length(min = 1, max = 100, message = "Case ID must be 1-100 characters"))]
    pub case_id: Option<String>,

    #[validate(length(min = 1, max = 500, message = "Title must be 1-500 characters"))]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,

    pub priority: Option<Priority>,

    /// Replaces every step when present
    pub steps: Option<Vec<StepInput>>,
}

/// Trims step text and rejects steps without an action
fn clean_steps(steps: Vec<StepInput>) -> ApiResult<Vec<StepInput>> {
    steps
        .into_iter()
        .enumerate()
        .map(|(index, step)| {
            let action = step.action.trim();
            if action.is_empty() {
                return Err(ApiError::invalid(
                    &format!("steps[{}].action", index),
                    "Step action must not be blank",
                ));
            }

            Ok(StepInput {
                action: action.to_string(),
                expected_result: optional_text(step.expected_result),
            })
        })
        .collect()
}

fn case_id_conflict(case_id: &str) -> ApiError {
    ApiError::Conflict(format!("Test case ID '{}' already exists in this module", case_id))
}

pub async fn create_test_case(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(suite_id): Path<Uuid>,
    req: ApiJson<CreateTestCaseRequest>,
) -> ApiResult<(StatusCode, Json<TestCaseWithSteps>)> {
    require_permission(&auth, Permission::AuthorTestCases)?;
    let scope = require_suite_access(&state.db, &auth, suite_id).await?;
    let req = req.validated()?;

    let case_id = required_text("case_id", &req.case_id)?;
    let title = required_text("title", &req.title)?;
    let steps = clean_steps(req.steps)?;

    let mut tx = state.db.begin().await?;

    if TestCase::case_id_taken(&mut *tx, scope.module_id, &case_id, None).await? {
        return Err(case_id_conflict(&case_id));
    }

    let created = TestCase::create(
        &mut *tx,
        CreateTestCase {
            suite_id,
            case_id,
            title,
            description: optional_text(req.description),
            priority: req.priority,
            steps,
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        test_case_id = %created.test_case.id,
        case_id = %created.test_case.case_id,
        steps = created.steps.len(),
        "Test case created"
    );

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_test_cases(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(suite_id): Path<Uuid>,
) -> ApiResult<Json<Vec<TestCaseWithSteps>>> {
    require_permission(&auth, Permission::Read)?;
    require_suite_access(&state.db, &auth, suite_id).await?;

    Ok(Json(TestCase::list_by_suite_with_steps(&state.db, suite_id).await?))
}

pub async fn get_test_case(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(test_case_id): Path<Uuid>,
) -> ApiResult<Json<TestCaseWithSteps>> {
    require_permission(&auth, Permission::Read)?;
    require_test_case_access(&state.db, &auth, test_case_id).await?;

    let test_case = TestCase::find_with_steps(&state.db, test_case_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Test case not found".to_string()))?;

    Ok(Json(test_case))
}

/// Updates fields and optionally replaces the steps
///
/// Steps are matched by position, so results recorded against surviving
/// positions stay attached.
pub async fn update_test_case(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(test_case_id): Path<Uuid>,
    req: ApiJson<UpdateTestCaseRequest>,
) -> ApiResult<Json<TestCaseWithSteps>> {
    require_permission(&auth, Permission::AuthorTestCases)?;
    let scope = require_test_case_access(&state.db, &auth, test_case_id).await?;
    let req = req.validated()?;

    let case_id = req.case_id.as_deref().map(|id| required_text("case_id", id)).transpose()?;
    let title = req.title.as_deref().map(|title| required_text("title", title)).transpose()?;
    let steps = req.steps.map(clean_steps).transpose()?;

    let mut tx = state.db.begin().await?;

    if let Some(case_id) = &case_id {
        if TestCase::case_id_taken(&mut *tx, scope.module_id, case_id, Some(test_case_id)).await? {
            return Err(case_id_conflict(case_id));
        }
    }

    let updated = TestCase::update(
        &mut *tx,
        test_case_id,
        UpdateTestCase {
            case_id,
            title,
            description: req.description.map(optional_text),
            priority: req.priority,
            steps,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Test case not found".to_string()))?;

    tx.commit().await?;

    Ok(Json(updated))
}

pub async fn delete_test_case(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(test_case_id): Path<Uuid>,
) -> ApiResult<Json<DeleteSummary>> {
    require_permission(&auth, Permission::AuthorTestCases)?;
    require_test_case_access(&state.db, &auth, test_case_id).await?;

    let summary = delete_subtree(&state.db, DeleteScope::TestCase(test_case_id))
        .await?
        .ok_or_else(|| ApiError::NotFound("Test case not found".to_string()))?;

    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_steps_trims_text() {
        let steps = clean_steps(vec![StepInput {
            action: "  Open cart ".to_string(),
            expected_result: Some("   ".to_string()),
        }])
        .unwrap();

        assert_eq!(steps[0].action, "Open cart");
        assert_eq!(steps[0].expected_result, None);
    }

    #[test]
    fn test_clean_steps_rejects_blank_action() {
        let result = clean_steps(vec![
            StepInput {
                action: "Open cart".to_string(),
                expected_result: None,
            },
            StepInput {
                action: " ".to_string(),
                expected_result: Some("Nothing".to_string()),
            },
        ]);

        match result {
            Err(ApiError::ValidationError(details)) => assert_eq!(details[0].field, "steps[1].action"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_create_request_defaults() {
        let req: CreateTestCaseRequest =
            serde_json::from_str(r#"{"case_id": "TC-1", "title": "Checkout"}"#).unwrap();

        assert_eq!(req.priority, Priority::Medium);
        assert!(req.steps.is_empty());
    }
}
