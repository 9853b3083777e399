/// Organization settings
///
/// - `GET /v1/organization` - Any member
/// - `PATCH /v1/organization` - ADMIN, renames the organization

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{required_text, ApiJson},
};
use axum::{extract::State, Json};
use serde::Deserialize;
use tcm_shared::{
    auth::{
        authorization::{require_permission, Permission},
        middleware::AuthContext,
    },
    models::organization::Organization,
};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateOrganizationRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,
}

pub async fn get_organization(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<Organization>> {
    require_permission(&auth, Permission::Read)?;

    let organization = Organization::find_by_id(&state.db, auth.organization_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Organization not found".to_string()))?;

    Ok(Json(organization))
}

pub async fn update_organization(
    State(state): State<AppState>,
    auth: AuthContext,
    req: ApiJson<UpdateOrganizationRequest>,
) -> ApiResult<Json<Organization>> {
    require_permission(&auth, Permission::ManageOrganization)?;
    let req = req.validated()?;
    let name = required_text("name", &req.name)?;

    let organization = Organization::rename(&state.db, auth.organization_id, &name)
        .await?
        .ok_or_else(|| ApiError::NotFound("Organization not found".to_string()))?;

    tracing::info!(organization_id = %organization.id, "Organization renamed");

    Ok(Json(organization))
}
