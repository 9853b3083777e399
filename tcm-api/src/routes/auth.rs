/// Authentication endpoints
///
/// This module provides the public session endpoints:
/// - Registration (creates an organization and its first administrator)
/// - Login
/// - Token refresh
/// - Logout
/// - Email verification
///
/// Sessions are carried by two HttpOnly cookies (access and refresh). The same
/// tokens are returned in the body for clients that prefer a Bearer header.
///
/// # Endpoints
///
/// - `POST /v1/auth/register` - Register organization and admin
/// - `POST /v1/auth/login` - Login and get tokens
/// - `POST /v1/auth/refresh` - Rotate tokens
/// - `POST /v1/auth/logout` - Clear session cookies
/// - `POST /v1/auth/verify-email` - Confirm an email address

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{required_text, ApiJson, OptionalJson},
};
use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, HeaderName, StatusCode},
    response::AppendHeaders,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tcm_shared::{
    auth::{
        jwt::{self, TokenType},
        middleware::{clear_cookie, cookie_from_headers, session_cookie, CookieOptions},
        password,
        token::{self, TokenKind},
    },
    mail::{token_link, VerificationMail},
    models::{
        email_verification::{verification_ttl, EmailVerification},
        organization::Organization,
        user::{CreateUser, User, UserProfile, UserRole},
    },
};
use validator::Validate;

/// Path the refresh cookie is scoped to
const REFRESH_COOKIE_PATH: &str = "/v1/auth";

/// Register request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 200, message = "Organization name must be 1-200 characters"))]
    pub organization_name: String,

    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Password (will be validated for strength)
    pub password: String,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Password
    pub password: String,
}

/// Refresh token request; the cookie is used when the body has no token
#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

/// Body of every response that starts a session
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: UserProfile,

    pub organization: Organization,

    /// Access token (24h)
    pub access_token: String,

    /// Refresh token (30d)
    pub refresh_token: String,

    /// Seconds until the access token expires
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct VerifyEmailResponse {
    pub verified: bool,
}

/// Cookies plus body of a new session
pub(crate) type SessionReply = (AppendHeaders<[(HeaderName, String); 2]>, Json<SessionResponse>);

/// Issues tokens for a user and packs them as cookies and JSON
pub(crate) fn start_session(
    state: &AppState,
    user: User,
    roles: Vec<UserRole>,
    organization: Organization,
) -> ApiResult<SessionReply> {
    let (access_token, refresh_token) =
        jwt::issue_session(user.id, user.organization_id, state.jwt_secret())?;

    let access_ttl = TokenType::Access.default_expiration().num_seconds();
    let refresh_ttl = TokenType::Refresh.default_expiration().num_seconds();

    let options = state.cookie_options();
    let refresh_options = CookieOptions {
        path: REFRESH_COOKIE_PATH.to_string(),
        ..options.clone()
    };

    let cookies = AppendHeaders([
        (
            SET_COOKIE,
            session_cookie(&state.config.auth.session_cookie, &access_token, access_ttl, &options),
        ),
        (
            SET_COOKIE,
            session_cookie(
                &state.config.auth.refresh_cookie,
                &refresh_token,
                refresh_ttl,
                &refresh_options,
            ),
        ),
    ]);

    Ok((
        cookies,
        Json(SessionResponse {
            user: UserProfile::new(user, roles),
            organization,
            access_token,
            refresh_token,
            expires_in: access_ttl,
        }),
    ))
}

/// Mails a verification link; failures are logged, the token stays valid
pub(crate) async fn send_verification_mail(state: &AppState, user: &User, token: &str) -> ApiResult<()> {
    let mail = VerificationMail {
        to: &user.email,
        name: &user.name,
        verify_url: token_link(&state.config.api.public_base_url, "verify-email", token),
    };

    state.mailer.send_verification(mail).await?;
    Ok(())
}

async fn load_organization(state: &AppState, organization_id: uuid::Uuid) -> ApiResult<Organization> {
    Organization::find_by_id(&state.db, organization_id)
        .await?
        .ok_or_else(|| ApiError::InternalError("User has no organization".to_string()))
}

/// Register a new organization and its first administrator
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/register
/// Content-Type: application/json
///
/// {
///   "organization_name": "Acme QA",
///   "name": "Jane Doe",
///   "email": "jane@acme.test",
///   "password": "SecureP@ss123"
/// }
/// ```
///
/// The organization, the user (with the ADMIN role) and an email
/// verification token are created in one transaction.
///
/// # Errors
///
/// - `409 Conflict`: Email already exists
/// - `422 Unprocessable Entity`: Validation failed or weak password
pub async fn register(
    State(state): State<AppState>,
    req: ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, SessionReply)> {
    let req = req.validated()?;
    let organization_name = required_text("organization_name", &req.organization_name)?;
    let name = required_text("name", &req.name)?;

    password::validate_password_strength(&req.password)?;
    let password_hash = password::hash_password(&req.password)?;

    let (verification_token, verification_hash) = token::generate_token(TokenKind::EmailVerification);

    let mut tx = state.db.begin().await?;

    let organization = Organization::create(&mut *tx, &organization_name).await?;
    let user = User::create(
        &mut *tx,
        CreateUser {
            organization_id: organization.id,
            email: req.email.trim().to_string(),
            password_hash,
            name,
            roles: vec![UserRole::Admin],
        },
    )
    .await?;
    EmailVerification::create(
        &mut *tx,
        user.id,
        &verification_hash,
        Utc::now() + verification_ttl(),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        user_id = %user.id,
        organization_id = %organization.id,
        "Organization registered"
    );

    if let Err(e) = send_verification_mail(&state, &user, &verification_token).await {
        tracing::warn!(user_id = %user.id, error = ?e, "Verification mail not sent");
    }

    let session = start_session(&state, user, vec![UserRole::Admin], organization)?;
    Ok((StatusCode::CREATED, session))
}

/// Login endpoint
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/login
/// Content-Type: application/json
///
/// {
///   "email": "jane@acme.test",
///   "password": "SecureP@ss123"
/// }
/// ```
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid credentials
/// - `403 Forbidden`: Email not verified (when verification is required)
pub async fn login(
    State(state): State<AppState>,
    req: ApiJson<LoginRequest>,
) -> ApiResult<SessionReply> {
    let req = req.validated()?;

    let user = User::find_by_email(&state.db, req.email.trim())
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid email or password".to_string()))?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        tracing::info!(user_id = %user.id, "Login rejected: wrong password");
        return Err(ApiError::Unauthorized("Invalid email or password".to_string()));
    }

    if state.config.auth.require_verified_email && !user.email_verified {
        return Err(ApiError::Forbidden("Email address is not verified".to_string()));
    }

    User::update_last_login(&state.db, user.id).await?;

    let roles = User::roles(&state.db, user.id).await?;
    let organization = load_organization(&state, user.organization_id).await?;

    tracing::info!(user_id = %user.id, "User logged in");

    start_session(&state, user, roles, organization)
}

/// Rotates both tokens
///
/// The refresh token is read from the request body or, if absent, from the
/// refresh cookie. The user must still exist in the same organization.
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    OptionalJson(body): OptionalJson<RefreshRequest>,
) -> ApiResult<SessionReply> {
    let token = body
        .and_then(|req| req.refresh_token)
        .or_else(|| cookie_from_headers(&headers, &state.config.auth.refresh_cookie))
        .ok_or_else(|| ApiError::Unauthorized("Missing refresh token".to_string()))?;

    let claims = jwt::validate_refresh_token(&token, state.jwt_secret())?;

    let user = User::find_by_id_and_org(&state.db, claims.sub, claims.organization_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User no longer exists".to_string()))?;

    let roles = User::roles(&state.db, user.id).await?;
    let organization = load_organization(&state, user.organization_id).await?;

    start_session(&state, user, roles, organization)
}

/// Clears both session cookies
pub async fn logout(
    State(state): State<AppState>,
) -> (StatusCode, AppendHeaders<[(HeaderName, String); 2]>) {
    let options = state.cookie_options();
    let refresh_options = CookieOptions {
        path: REFRESH_COOKIE_PATH.to_string(),
        ..options.clone()
    };

    (
        StatusCode::NO_CONTENT,
        AppendHeaders([
            (SET_COOKIE, clear_cookie(&state.config.auth.session_cookie, &options)),
            (SET_COOKIE, clear_cookie(&state.config.auth.refresh_cookie, &refresh_options)),
        ]),
    )
}

/// Confirms an email address with a one-time token
///
/// # Errors
///
/// - `400 Bad Request`: Token malformed, unknown, used or expired
pub async fn verify_email(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<VerifyEmailRequest>,
) -> ApiResult<Json<VerifyEmailResponse>> {
    let invalid = || ApiError::BadRequest("Verification link is invalid or has expired".to_string());

    let token = req.token.trim();
    if !token::validate_token_format(TokenKind::EmailVerification, token) {
        return Err(invalid());
    }

    let mut tx = state.db.begin().await?;

    let verification = EmailVerification::find_by_token_hash_for_update(&mut *tx, &token::hash_token(token))
        .await?
        .filter(|verification| verification.is_usable(Utc::now()))
        .ok_or_else(invalid)?;

    EmailVerification::mark_verified(&mut *tx, verification.id).await?;
    User::mark_email_verified(&mut *tx, verification.user_id).await?;

    tx.commit().await?;

    tracing::info!(user_id = %verification.user_id, "Email verified");

    Ok(Json(VerifyEmailResponse { verified: true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_validation() {
        let valid = RegisterRequest {
            organization_name: "Acme QA".to_string(),
            name: "Jane".to_string(),
            email: "jane@acme.test".to_string(),
            password: "SecureP@ss123".to_string(),
        };
        assert!(valid.validate().is_ok());

        let invalid = RegisterRequest {
            organization_name: String::new(),
            email: "not-an-email".to_string(),
            ..valid
        };
        let errors = invalid.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("organization_name"));
        assert!(fields.contains_key("email"));
    }

    #[test]
    fn test_refresh_request_token_is_optional() {
        let req: RefreshRequest = serde_json::from_str("{}").unwrap();
        assert!(req.refresh_token.is_none());
    }
}
