/// Module endpoints
///
/// - `POST /v1/projects/:id/modules` - ADMIN
/// - `GET /v1/projects/:id/modules`
/// - `GET|PATCH|DELETE /v1/modules/:id` - writes need ADMIN
/// - `GET|PUT /v1/modules/:id/users`
/// - `DELETE /v1/modules/:id/users/:user_id`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{double_option, optional_text, required_text, ApiJson},
    routes::projects::AssignUsersRequest,
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
            require_module_access, require_organization_members, require_permission, require_project_access,
            Permission,
        },
        middleware::AuthContext,
    },
    models::{
        cascade::{delete_subtree, DeleteScope, DeleteSummary},
        project::Project,
        test_module::{CreateTestModule, TestModule, UpdateTestModule},
        user::User,
    },
};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateModuleRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateModuleRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

async fn load_module(state: &AppState, module_id: Uuid) -> ApiResult<TestModule> {
    TestModule::find_by_id(&state.db, module_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Module not found".to_string()))
}

pub async fn create_module(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(project_id): Path<Uuid>,
    req: ApiJson<CreateModuleRequest>,
) -> ApiResult<(StatusCode, Json<TestModule>)> {
    require_permission(&auth, Permission::ManageProjects)?;
    let project = require_project_access(&state.db, &auth, project_id).await?;
    let req = req.validated()?;

    let module = TestModule::create(
        &state.db,
        CreateTestModule {
            project_id: project.id,
            name: required_text("name", &req.name)?,
            description: optional_text(req.description),
        },
    )
    .await?;

    tracing::info!(module_id = %module.id, project_id = %project.id, "Module created");

    Ok((StatusCode::CREATED, Json(module)))
}

/// Lists modules of a project
///
/// Admins and users assigned to the project see every module; users assigned
/// only to some modules see just those.
pub async fn list_modules(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Vec<TestModule>>> {
    require_permission(&auth, Permission::Read)?;
    let project = require_project_access(&state.db, &auth, project_id).await?;

    let modules = if auth.is_admin() || Project::is_assigned(&state.db, project.id, auth.user_id).await? {
        TestModule::list_by_project(&state.db, project.id).await?
    } else {
        TestModule::list_visible_to(&state.db, project.id, auth.user_id).await?
    };

    Ok(Json(modules))
}

pub async fn get_module(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(module_id): Path<Uuid>,
) -> ApiResult<Json<TestModule>> {
    require_permission(&auth, Permission::Read)?;
    let scope = require_module_access(&state.db, &auth, module_id).await?;

    Ok(Json(load_module(&state, scope.module_id).await?))
}

pub async fn update_module(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(module_id): Path<Uuid>,
    req: ApiJson<UpdateModuleRequest>,
) -> ApiResult<Json<TestModule>> {
    require_permission(&auth, Permission::ManageProjects)?;
    let scope = require_module_access(&state.db, &auth, module_id).await?;
    let req = req.validated()?;

    let name = req.name.as_deref().map(|name| required_text("name", name)).transpose()?;

    let module = TestModule::update(
        &state.db,
        scope.module_id,
        UpdateTestModule {
            name,
            description: req.description.map(optional_text),
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Module not found".to_string()))?;

    Ok(Json(module))
}

pub async fn delete_module(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(module_id): Path<Uuid>,
) -> ApiResult<Json<DeleteSummary>> {
    require_permission(&auth, Permission::ManageProjects)?;
    let scope = require_module_access(&state.db, &auth, module_id).await?;

    let summary = delete_subtree(&state.db, DeleteScope::Module(scope.module_id))
        .await?
        .ok_or_else(|| ApiError::NotFound("Module not found".to_string()))?;

    Ok(Json(summary))
}

pub async fn list_module_users(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(module_id): Path<Uuid>,
) -> ApiResult<Json<Vec<User>>> {
    require_permission(&auth, Permission::Read)?;
    let scope = require_module_access(&state.db, &auth, module_id).await?;

    Ok(Json(TestModule::assigned_users(&state.db, scope.module_id).await?))
}

pub async fn assign_module_users(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(module_id): Path<Uuid>,
    ApiJson(req): ApiJson<AssignUsersRequest>,
) -> ApiResult<Json<Vec<User>>> {
    require_permission(&auth, Permission::ManageProjects)?;
    let scope = require_module_access(&state.db, &auth, module_id).await?;

    let user_ids = req.unique_ids();
    require_organization_members(&state.db, auth.organization_id, &user_ids).await?;

    let mut tx = state.db.begin().await?;
    TestModule::set_assigned_users(&mut *tx, scope.module_id, &user_ids).await?;
    tx.commit().await?;

    tracing::info!(module_id = %scope.module_id, users = user_ids.len(), "Module assignments replaced");

    Ok(Json(TestModule::assigned_users(&state.db, scope.module_id).await?))
}

pub async fn unassign_module_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((module_id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    require_permission(&auth, Permission::ManageProjects)?;
    let scope = require_module_access(&state.db, &auth, module_id).await?;

    if !TestModule::unassign_user(&state.db, scope.module_id, user_id).await? {
        return Err(ApiError::NotFound("User is not assigned to this module".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
