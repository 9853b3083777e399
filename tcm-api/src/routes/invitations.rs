/// Invitations into an organization
///
/// # Endpoints
///
/// - `POST /v1/invitations` - ADMIN, invite an email address with roles
/// - `GET /v1/invitations` - ADMIN, pending invitations
/// - `DELETE /v1/invitations/:id` - ADMIN, revoke a pending invitation
/// - `POST /v1/auth/accept-invitation` - Public, create the account
///
/// The invitation token is shown once, in the create response and the mail;
/// only its SHA-256 hash is stored.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{required_text, ApiJson},
    routes::auth::{start_session, SessionReply},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tcm_shared::{
    auth::{
        authorization::{require_permission, Permission},
        middleware::AuthContext,
        password,
        token::{self, TokenKind},
    },
    mail::{token_link, InvitationMail},
    models::{
        invitation::{invitation_ttl, CreateInvitation, Invitation},
        organization::Organization,
        user::{normalize_roles, CreateUser, User, UserRole},
    },
};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvitationRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "At least one role is required"))]
    pub roles: Vec<UserRole>,
}

#[derive(Debug, Serialize)]
pub struct CreateInvitationResponse {
    pub invitation: Invitation,

    /// Plaintext token, never retrievable again
    pub token: String,

    pub accept_url: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AcceptInvitationRequest {
    pub token: String,

    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    pub password: String,
}

/// Invites an email address into the caller's organization
///
/// A pending invitation for the same address is replaced.
///
/// # Errors
///
/// - `409 Conflict`: The address already has an account
/// - `422`: Invalid email or empty role list
pub async fn create_invitation(
    State(state): State<AppState>,
    auth: AuthContext,
    req: ApiJson<CreateInvitationRequest>,
) -> ApiResult<(StatusCode, Json<CreateInvitationResponse>)> {
    require_permission(&auth, Permission::ManageOrganization)?;
    let req = req.validated()?;
    let email = req.email.trim().to_string();

    if User::find_by_email(&state.db, &email).await?.is_some() {
        return Err(ApiError::Conflict("A user with this email already exists".to_string()));
    }

    let organization = Organization::find_by_id(&state.db, auth.organization_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Organization not found".to_string()))?;
    let inviter = User::find_by_id_and_org(&state.db, auth.user_id, auth.organization_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User no longer exists".to_string()))?;

    let (invitation_token, token_hash) = token::generate_token(TokenKind::Invitation);

    let mut conn = state.db.acquire().await?;
    let invitation = Invitation::create(
        &mut *conn,
        CreateInvitation {
            organization_id: auth.organization_id,
            email,
            roles: normalize_roles(req.roles),
            token_hash,
            invited_by: Some(auth.user_id),
            expires_at: Utc::now() + invitation_ttl(),
        },
    )
    .await?;
    drop(conn);

    let accept_url = token_link(
        &state.config.api.public_base_url,
        "accept-invitation",
        &invitation_token,
    );

    let mail = InvitationMail {
        to: &invitation.email,
        organization_name: &organization.name,
        invited_by: &inviter.name,
        accept_url: accept_url.clone(),
    };
    if let Err(e) = state.mailer.send_invitation(mail).await {
        tracing::warn!(invitation_id = %invitation.id, error = %e, "Invitation mail not sent");
    }

    tracing::info!(
        invitation_id = %invitation.id,
        organization_id = %auth.organization_id,
        invited_by = %auth.user_id,
        "Invitation created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateInvitationResponse {
            invitation,
            token: invitation_token,
            accept_url,
        }),
    ))
}

pub async fn list_invitations(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<Vec<Invitation>>> {
    require_permission(&auth, Permission::ManageOrganization)?;

    let invitations = Invitation::list_pending(&state.db, auth.organization_id).await?;
    Ok(Json(invitations))
}

pub async fn revoke_invitation(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(invitation_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_permission(&auth, Permission::ManageOrganization)?;

    if !Invitation::revoke(&state.db, invitation_id, auth.organization_id).await? {
        return Err(ApiError::NotFound("Invitation not found".to_string()));
    }

    tracing::info!(invitation_id = %invitation_id, revoked_by = %auth.user_id, "Invitation revoked");

    Ok(StatusCode::NO_CONTENT)
}

/// Creates the invited account and starts a session
///
/// The invitation row is locked for the transaction, so a token can only be
/// redeemed once. Receiving the mail proves the address, so the new account
/// starts verified.
///
/// # Errors
///
/// - `400 Bad Request`: Token malformed, unknown, accepted or expired
/// - `409 Conflict`: The address registered in the meantime
/// - `422`: Invalid name or weak password
pub async fn accept_invitation(
    State(state): State<AppState>,
    req: ApiJson<AcceptInvitationRequest>,
) -> ApiResult<(StatusCode, SessionReply)> {
    let req = req.validated()?;
    let invalid = || ApiError::BadRequest("Invitation is invalid or has expired".to_string());

    let invitation_token = req.token.trim();
    if !token::validate_token_format(TokenKind::Invitation, invitation_token) {
        return Err(invalid());
    }

    let name = required_text("name", &req.name)?;
    password::validate_password_strength(&req.password)?;
    let password_hash = password::hash_password(&req.password)?;

    let mut tx = state.db.begin().await?;

    let invitation = Invitation::find_by_token_hash_for_update(&mut *tx, &token::hash_token(invitation_token))
        .await?
        .filter(|invitation| invitation.is_pending(Utc::now()))
        .ok_or_else(invalid)?;

    let user = User::create(
        &mut *tx,
        CreateUser {
            organization_id: invitation.organization_id,
            email: invitation.email.clone(),
            password_hash,
            name,
            roles: invitation.roles.clone(),
        },
    )
    .await?;
    User::mark_email_verified(&mut *tx, user.id).await?;
    Invitation::mark_accepted(&mut *tx, invitation.id).await?;

    tx.commit().await?;

    tracing::info!(
        user_id = %user.id,
        invitation_id = %invitation.id,
        organization_id = %invitation.organization_id,
        "Invitation accepted"
    );

    let user = User {
        email_verified: true,
        ..user
    };
    let roles = normalize_roles(invitation.roles);
    let organization = Organization::find_by_id(&state.db, invitation.organization_id)
        .await?
        .ok_or_else(|| ApiError::InternalError("Invitation has no organization".to_string()))?;

    let session = start_session(&state, user, roles, organization)?;
    Ok((StatusCode::CREATED, session))
}
