/// Organization members (ADMIN only)
///
/// - `GET /v1/users` - Members with their roles
/// - `PUT /v1/users/:id/roles` - Replace a member's roles
/// - `DELETE /v1/users/:id` - Remove a member

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::ApiJson,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tcm_shared::{
    auth::{
        authorization::{require_permission, Permission},
        middleware::AuthContext,
    },
    models::user::{normalize_roles, User, UserProfile, UserRole},
};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SetRolesRequest {
    pub roles: Vec<UserRole>,
}

/// Rejects a role change that takes ADMIN away from `target`
/// when it is the caller or the last admin in `admins`
fn check_admin_remains(caller: Uuid, target: Uuid, admins: &[Uuid]) -> ApiResult<()> {
    if target == caller {
        return Err(ApiError::invalid("roles", "You cannot remove your own ADMIN role"));
    }
    if admins.contains(&target) && admins.len() <= 1 {
        return Err(ApiError::invalid("roles", "The organization needs at least one ADMIN"));
    }
    Ok(())
}

pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<Vec<UserProfile>>> {
    require_permission(&auth, Permission::ManageOrganization)?;

    let users = User::list_by_organization(&state.db, auth.organization_id).await?;
    let ids: Vec<Uuid> = users.iter().map(|user| user.id).collect();
    let mut roles = User::roles_for_users(&state.db, &ids).await?;

    let profiles = users
        .into_iter()
        .map(|user| {
            let user_roles = roles.remove(&user.id).unwrap_or_default();
            UserProfile::new(user, user_roles)
        })
        .collect();

    Ok(Json(profiles))
}

/// Replaces a member's roles
///
/// # Errors
///
/// - `422`: No roles given, or the change would leave the organization
///   without an administrator
/// - `404 Not Found`: No such member
pub async fn set_roles(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
    ApiJson(req): ApiJson<SetRolesRequest>,
) -> ApiResult<Json<UserProfile>> {
    require_permission(&auth, Permission::ManageOrganization)?;

    let roles = normalize_roles(req.roles);
    if roles.is_empty() {
        return Err(ApiError::invalid("roles", "At least one role is required"));
    }

    let user = User::find_by_id_and_org(&state.db, user_id, auth.organization_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let mut tx = state.db.begin().await?;

    if !roles.contains(&UserRole::Admin) {
        let admins = User::lock_admin_ids(&mut *tx, auth.organization_id).await?;
        check_admin_remains(auth.user_id, user.id, &admins)?;
    }

    User::set_roles(&mut *tx, user.id, &roles).await?;
    tx.commit().await?;

    tracing::info!(
        user_id = %user.id,
        changed_by = %auth.user_id,
        roles = ?roles,
        "User roles updated"
    );

    Ok(Json(UserProfile::new(user, roles)))
}

pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_permission(&auth, Permission::ManageOrganization)?;

    if user_id == auth.user_id {
        return Err(ApiError::BadRequest("You cannot delete your own account".to_string()));
    }

    if !User::delete(&state.db, user_id, auth.organization_id).await? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    tracing::info!(user_id = %user_id, deleted_by = %auth.user_id, "User deleted");

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_keeps_own_admin_role() {
        let caller = Uuid::new_v4();
        assert!(check_admin_remains(caller, caller, &[caller, Uuid::new_v4()]).is_err());
    }

    #[test]
    fn test_last_admin_cannot_be_demoted() {
        let (caller, target) = (Uuid::new_v4(), Uuid::new_v4());

        match check_admin_remains(caller, target, &[target]) {
            Err(ApiError::ValidationError(details)) => assert_eq!(details[0].field, "roles"),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(check_admin_remains(caller, target, &[caller, target]).is_ok());
        // Demoting a non-admin never empties the admin set
        assert!(check_admin_remains(caller, target, &[caller]).is_ok());
    }
}
