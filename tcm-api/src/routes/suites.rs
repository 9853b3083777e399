/// Suite endpoints
///
/// Suites group test cases inside a module. Creating and editing them needs
/// authoring rights (ADMIN, QA, BA).

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
        authorization::{require_module_access, require_permission, require_suite_access, Permission},
        middleware::AuthContext,
    },
    models::{
        cascade::{delete_subtree, DeleteScope, DeleteSummary},
        test_suite::{CreateTestSuite, TestSuite, UpdateTestSuite},
    },
};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSuiteRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSuiteRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

pub async fn create_suite(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(module_id): Path<Uuid>,
    req: ApiJson<CreateSuiteRequest>,
) -> ApiResult<(StatusCode, Json<TestSuite>)> {
    require_permission(&auth, Permission::AuthorTestCases)?;
    let scope = require_module_access(&state.db, &auth, module_id).await?;
    let req = req.validated()?;

    let suite = TestSuite::create(
        &state.db,
        CreateTestSuite {
            module_id: scope.module_id,
            name: required_text("name", &req.name)?,
            description: optional_text(req.description),
        },
    )
    .await?;

    tracing::info!(suite_id = %suite.id, module_id = %scope.module_id, "Suite created");

    Ok((StatusCode::CREATED, Json(suite)))
}

pub async fn list_suites(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(module_id): Path<Uuid>,
) -> ApiResult<Json<Vec<TestSuite>>> {
    require_permission(&auth, Permission::Read)?;
    let scope = require_module_access(&state.db, &auth, module_id).await?;

    Ok(Json(TestSuite::list_by_module(&state.db, scope.module_id).await?))
}

pub async fn get_suite(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(suite_id): Path<Uuid>,
) -> ApiResult<Json<TestSuite>> {
    require_permission(&auth, Permission::Read)?;
    require_suite_access(&state.db, &auth, suite_id).await?;

    let suite = TestSuite::find_by_id(&state.db, suite_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Suite not found".to_string()))?;

    Ok(Json(suite))
}

pub async fn update_suite(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(suite_id): Path<Uuid>,
    req: ApiJson<UpdateSuiteRequest>,
) -> ApiResult<Json<TestSuite>> {
    require_permission(&auth, Permission::AuthorTestCases)?;
    require_suite_access(&state.db, &auth, suite_id).await?;
    let req = req.validated()?;

    let name = req.name.as_deref().map(|name| required_text("name", name)).transpose()?;

    let suite = TestSuite::update(
        &state.db,
        suite_id,
        UpdateTestSuite {
            name,
            description: req.description.map(optional_text),
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Suite not found".to_string()))?;

    Ok(Json(suite))
}

pub async fn delete_suite(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(suite_id): Path<Uuid>,
) -> ApiResult<Json<DeleteSummary>> {
    require_permission(&auth, Permission::AuthorTestCases)?;
    require_suite_access(&state.db, &auth, suite_id).await?;

    let summary = delete_subtree(&state.db, DeleteScope::Suite(suite_id))
        .await?
        .ok_or_else(|| ApiError::NotFound("Suite not found".to_string()))?;

    Ok(Json(summary))
}
