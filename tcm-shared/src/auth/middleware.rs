/// Session authentication for Axum
///
/// Browsers authenticate with the access token in an HttpOnly session cookie;
/// API clients may send the same token as `Authorization: Bearer <jwt>`. The
/// cookie wins when both are present.
///
/// After the token validates, the user and their roles are loaded from the
/// database so that deleted users and role changes take effect immediately.
/// The resulting `AuthContext` goes into request extensions, and handlers take
/// it as an extractor.
///
/// # Example
///
/// ```no_run
/// use tcm_shared::auth::middleware::AuthContext;
///
/// async fn whoami(auth: AuthContext) -> String {
///     format!("{} in organization {}", auth.email, auth.organization_id)
/// }
/// ```

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use super::jwt::{validate_access_token, JwtError};
use crate::models::user::{User, UserRole};

/// Where the session token was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Cookie,
    Bearer,
}

/// Authenticated caller, added to request extensions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: Uuid,

    pub organization_id: Uuid,

    pub email: String,

    pub email_verified: bool,

    /// Roles loaded for this request, sorted
    pub roles: Vec<UserRole>,

    pub method: AuthMethod,
}

impl AuthContext {
    pub fn new(user: &User, roles: Vec<UserRole>, method: AuthMethod) -> Self {
        Self {
            user_id: user.id,
            organization_id: user.organization_id,
            email: user.email.clone(),
            email_verified: user.email_verified,
            roles,
            method,
        }
    }

    pub fn has_role(&self, role: UserRole) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(UserRole::Admin)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AuthError::MissingCredentials)
    }
}

/// Authentication failure
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing credentials")]
    MissingCredentials,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Session expired")]
    Expired,

    /// Token was valid but the user no longer exists
    #[error("Unknown user")]
    UnknownUser,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::Expired,
            other => AuthError::InvalidToken(other.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthError::DatabaseError(e) => {
                tracing::error!(error = %e, "Database error during authentication");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            other => (StatusCode::UNAUTHORIZED, other.to_string()),
        };

        let error = if status == StatusCode::UNAUTHORIZED {
            "unauthorized"
        } else {
            "internal_error"
        };

        (status, Json(json!({ "error": error, "message": message }))).into_response()
    }
}

/// Returns the value of cookie `name` from a `Cookie` header value
///
/// ```
/// use tcm_shared::auth::middleware::parse_cookie;
///
/// assert_eq!(parse_cookie("a=1; tcm_session=xyz", "tcm_session"), Some("xyz"));
/// assert_eq!(parse_cookie("a=1", "tcm_session"), None);
/// ```
pub fn parse_cookie<'a>(header_value: &'a str, name: &str) -> Option<&'a str> {
    header_value
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|value| !value.is_empty())
}

/// Finds a cookie across all `Cookie` headers of a request
pub fn cookie_from_headers(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| parse_cookie(value, name))
        .map(str::to_string)
}

/// Extracts the session token, preferring the cookie over a Bearer header
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<(String, AuthMethod)> {
    if let Some(token) = cookie_from_headers(headers, cookie_name) {
        return Some((token, AuthMethod::Cookie));
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| (token.to_string(), AuthMethod::Bearer))
}

/// Validates the request's session and loads the caller
pub async fn authenticate(
    pool: &PgPool,
    secret: &str,
    cookie_name: &str,
    headers: &HeaderMap,
) -> Result<AuthContext, AuthError> {
    let (token, method) = extract_token(headers, cookie_name).ok_or(AuthError::MissingCredentials)?;

    let claims = validate_access_token(&token, secret)?;

    let user = User::find_by_id(pool, claims.sub)
        .await?
        .filter(|user| user.organization_id == claims.organization_id)
        .ok_or(AuthError::UnknownUser)?;

    let roles = User::roles(pool, user.id).await?;

    Ok(AuthContext::new(&user, roles, method))
}

/// Attributes for session cookies
#[derive(Debug, Clone)]
pub struct CookieOptions {
    /// Adds `Secure`; enable whenever served over HTTPS
    pub secure: bool,

    pub path: String,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            secure: false,
            path: "/".to_string(),
        }
    }
}

/// Builds a `Set-Cookie` value for an HttpOnly, SameSite=Lax cookie
///
/// ```
/// use tcm_shared::auth::middleware::{session_cookie, CookieOptions};
///
/// let cookie = session_cookie("tcm_session", "abc", 3600, &CookieOptions::default());
/// assert_eq!(cookie, "tcm_session=abc; Path=/; Max-Age=3600; HttpOnly; SameSite=Lax");
/// ```
pub fn session_cookie(name: &str, value: &str, max_age_secs: i64, options: &CookieOptions) -> String {
    let mut cookie = format!(
        "{}={}; Path={}; Max-Age={}; HttpOnly; SameSite=Lax",
        name,
        value,
        options.path,
        max_age_secs.max(0)
    );

    if options.secure {
        cookie.push_str("; Secure");
    }

    cookie
}

/// Builds a `Set-Cookie` value that removes a cookie
pub fn clear_cookie(name: &str, options: &CookieOptions) -> String {
    session_cookie(name, "", 0, options)
}
