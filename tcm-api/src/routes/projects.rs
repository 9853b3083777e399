/// Project endpoints
///
/// # Endpoints
///
/// - `POST /v1/projects` - ADMIN
/// - `GET /v1/projects` - Admins see all; others see projects they are
///   assigned to directly or through a module
/// - `GET /v1/projects/:id`
/// - `PATCH /v1/projects/:id` - ADMIN
/// - `DELETE /v1/projects/:id` - ADMIN, deletes the whole subtree
/// - `GET /v1/projects/:id/users`
/// - `PUT /v1/projects/:id/users` - ADMIN, replaces the assignment set

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
        authorization::{require_organization_members, require_permission, require_project_access, Permission},
        middleware::AuthContext,
    },
    models::{
        cascade::{delete_subtree, DeleteScope, DeleteSummary},
        project::{CreateProject, Project, UpdateProject},
        user::User,
    },
};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    pub description: Option<String>,
}

/// Partial update; `"description": null` clears the description
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProjectRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

/// Replaces the set of users assigned to a project or module
#[derive(Debug, Deserialize)]
pub struct AssignUsersRequest {
    pub user_ids: Vec<Uuid>,
}

impl AssignUsersRequest {
    /// User IDs without duplicates, in request order
    pub fn unique_ids(&self) -> Vec<Uuid> {
        let mut ids = Vec::with_capacity(self.user_ids.len());
        for id in &self.user_ids {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        ids
    }
}

pub async fn create_project(
    State(state): State<AppState>,
    auth: AuthContext,
    req: ApiJson<CreateProjectRequest>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    require_permission(&auth, Permission::ManageProjects)?;
    let req = req.validated()?;

    let project = Project::create(
        &state.db,
        CreateProject {
            organization_id: auth.organization_id,
            name: required_text("name", &req.name)?,
            description: optional_text(req.description),
        },
    )
    .await?;

    tracing::info!(project_id = %project.id, created_by = %auth.user_id, "Project created");

    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn list_projects(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<Vec<Project>>> {
    require_permission(&auth, Permission::Read)?;

    let projects = if auth.is_admin() {
        Project::list_by_organization(&state.db, auth.organization_id).await?
    } else {
        Project::list_visible_to(&state.db, auth.organization_id, auth.user_id).await?
    };

    Ok(Json(projects))
}

pub async fn get_project(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Project>> {
    require_permission(&auth, Permission::Read)?;

    let project = require_project_access(&state.db, &auth, project_id).await?;
    Ok(Json(project))
}

pub async fn update_project(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(project_id): Path<Uuid>,
    req: ApiJson<UpdateProjectRequest>,
) -> ApiResult<Json<Project>> {
    require_permission(&auth, Permission::ManageProjects)?;
    let req = req.validated()?;

    let name = req.name.as_deref().map(|name| required_text("name", name)).transpose()?;

    let project = Project::update(
        &state.db,
        project_id,
        auth.organization_id,
        UpdateProject {
            name,
            description: req.description.map(optional_text),
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Project not found".to_string()))?;

    Ok(Json(project))
}

/// Deletes a project with its modules, suites, cases and executions
pub async fn delete_project(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<DeleteSummary>> {
    require_permission(&auth, Permission::ManageProjects)?;
    let project = require_project_access(&state.db, &auth, project_id).await?;

    let summary = delete_subtree(&state.db, DeleteScope::Project(project.id))
        .await?
        .ok_or_else(|| ApiError::NotFound("Project not found".to_string()))?;

    Ok(Json(summary))
}

pub async fn list_project_users(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Vec<User>>> {
    require_permission(&auth, Permission::Read)?;
    let project = require_project_access(&state.db, &auth, project_id).await?;

    let users = Project::assigned_users(&state.db, project.id).await?;
    Ok(Json(users))
}

/// Replaces the users assigned to a project
///
/// # Errors
///
/// - `422`: A user ID is not a member of the organization
pub async fn assign_project_users(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(project_id): Path<Uuid>,
    ApiJson(req): ApiJson<AssignUsersRequest>,
) -> ApiResult<Json<Vec<User>>> {
    require_permission(&auth, Permission::ManageProjects)?;
    let project = require_project_access(&state.db, &auth, project_id).await?;

    let user_ids = req.unique_ids();
    require_organization_members(&state.db, auth.organization_id, &user_ids).await?;

    let mut tx = state.db.begin().await?;
    Project::set_assigned_users(&mut *tx, project.id, &user_ids).await?;
    tx.commit().await?;

    tracing::info!(project_id = %project.id, users = user_ids.len(), "Project assignments replaced");

    let users = Project::assigned_users(&state.db, project.id).await?;
    Ok(Json(users))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_ids_keeps_first_occurrence() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let req = AssignUsersRequest {
            user_ids: vec![a, b, a],
        };

        assert_eq!(req.unique_ids(), vec![a, b]);
    }

    #[test]
    fn test_update_request_name_length() {
        let req: UpdateProjectRequest = serde_json::from_str(r#"{"name": ""}"#).unwrap();
        assert!(req.validate().is_err());

        let req: UpdateProjectRequest = serde_json::from_str(r#"{"description": null}"#).unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.description, Some(None));
    }
}
