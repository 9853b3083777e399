/// Pass-rate reports (ADMIN, QA, BA)
///
/// Only the latest execution of each test case counts toward the result
/// totals; `execution_count` still counts every run.

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Path, State},
    Json,
};
use tcm_shared::{
    analytics::{self, ModuleAnalytics, ProjectAnalytics},
    auth::{
        authorization::{require_module_access, require_permission, require_project_access, Permission},
        middleware::AuthContext,
    },
};
use uuid::Uuid;

/// Project totals with a per-module breakdown
///
/// Non-admins only see the modules they can open.
pub async fn project_analytics(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<ProjectAnalytics>> {
    require_permission(&auth, Permission::ViewReports)?;
    let project = require_project_access(&state.db, &auth, project_id).await?;

    let viewer = (!auth.is_admin()).then_some(auth.user_id);

    Ok(Json(analytics::project_analytics(&state.db, project.id, viewer).await?))
}

/// Module totals with a per-suite breakdown
pub async fn module_analytics(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(module_id): Path<Uuid>,
) -> ApiResult<Json<ModuleAnalytics>> {
    require_permission(&auth, Permission::ViewReports)?;
    let scope = require_module_access(&state.db, &auth, module_id).await?;

    Ok(Json(analytics::module_analytics(&state.db, scope.module_id).await?))
}
