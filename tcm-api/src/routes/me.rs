/// The caller's own profile
///
/// - `GET /v1/me` - Profile, roles and organization
/// - `POST /v1/me/resend-verification` - Mail a fresh verification link

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::auth::send_verification_mail,
};
use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;
use tcm_shared::{
    auth::{
        middleware::AuthContext,
        token::{generate_token, TokenKind},
    },
    models::{
        email_verification::{verification_ttl, EmailVerification},
        organization::Organization,
        user::{User, UserProfile},
    },
};

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserProfile,
    pub organization: Organization,
}

#[derive(Debug, Serialize)]
pub struct ResendResponse {
    pub sent: bool,
}

pub async fn me(State(state): State<AppState>, auth: AuthContext) -> ApiResult<Json<MeResponse>> {
    let user = User::find_by_id_and_org(&state.db, auth.user_id, auth.organization_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let organization = Organization::find_by_id(&state.db, auth.organization_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Organization not found".to_string()))?;

    Ok(Json(MeResponse {
        user: UserProfile::new(user, auth.roles),
        organization,
    }))
}

/// Replaces any unused verification token and mails the new one
///
/// # Errors
///
/// - `409 Conflict`: Already verified
/// - `503 Service Unavailable`: The mail could not be delivered
pub async fn resend_verification(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<(StatusCode, Json<ResendResponse>)> {
    if auth.email_verified {
        return Err(ApiError::Conflict("Email address is already verified".to_string()));
    }

    let user = User::find_by_id_and_org(&state.db, auth.user_id, auth.organization_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let (token, token_hash) = generate_token(TokenKind::EmailVerification);

    let mut conn = state.db.acquire().await?;
    EmailVerification::create(&mut *conn, user.id, &token_hash, Utc::now() + verification_ttl()).await?;
    drop(conn);

    send_verification_mail(&state, &user, &token).await?;

    tracing::info!(user_id = %user.id, "Verification mail re-sent");

    Ok((StatusCode::ACCEPTED, Json(ResendResponse { sent: true })))
}
