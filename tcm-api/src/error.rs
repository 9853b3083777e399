/// Error handling for the API server
///
/// This module provides a unified error type that maps to HTTP responses.
/// All handlers should return `Result<T, ApiError>` which automatically
/// converts to appropriate HTTP status codes.
///
/// # Example
///
/// ```
/// use tcm_api::error::{ApiError, ApiResult};
/// use axum::Json;
/// use serde_json::json;
///
/// async fn handler(name: Option<String>) -> ApiResult<Json<serde_json::Value>> {
///     let name = name.ok_or_else(|| ApiError::BadRequest("name is required".to_string()))?;
///     Ok(Json(json!({ "name": name })))
/// }
/// ```

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tcm_shared::auth::{
    authorization::AuthzError, jwt::JwtError, middleware::AuthError, password::PasswordError,
};
use tcm_shared::mail::MailError;
use tcm_shared::transfer::TransferError;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),

    /// Unauthorized (401)
    Unauthorized(String),

    /// Forbidden (403)
    Forbidden(String),

    /// Not found (404)
    NotFound(String),

    /// Conflict (409) - e.g., duplicate email or case ID
    Conflict(String),

    /// Payload too large (413)
    PayloadTooLarge(String),

    /// Unprocessable entity (422) - validation errors
    ValidationError(Vec<ValidationErrorDetail>),

    /// Internal server error (500)
    InternalError(String),

    /// Service unavailable (503)
    ServiceUnavailable(String),
}

/// Validation error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    /// Error message
    pub message: String,
}

impl ValidationErrorDetail {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "bad_request", "unauthorized")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Optional validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ApiError {
    /// Single-field validation failure
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ApiError::ValidationError(vec![ValidationErrorDetail::new(field, message)])
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::PayloadTooLarge(msg) => write!(f, "Payload too large: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", msg, None)
            }
            ApiError::ValidationError(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg, None)
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

/// Convert sqlx errors to API errors
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                match db_err.constraint() {
                    Some(constraint) if constraint.contains("email") => {
                        ApiError::Conflict("Email already exists".to_string())
                    }
                    Some(constraint) if constraint.starts_with("projects_") => {
                        ApiError::Conflict("A project with this name already exists".to_string())
                    }
                    Some(constraint) => {
                        ApiError::Conflict(format!("Constraint violation: {}", constraint))
                    }
                    None => ApiError::Conflict("Resource already exists".to_string()),
                }
            }
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                ApiError::BadRequest("Referenced resource does not exist".to_string())
            }
            sqlx::Error::PoolTimedOut => {
                ApiError::ServiceUnavailable("Database is not available".to_string())
            }
            _ => ApiError::InternalError(format!("Database error: {}", err)),
        }
    }
}

/// Convert auth errors to API errors
impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::DatabaseError(e) => ApiError::from(e),
            other => ApiError::Unauthorized(other.to_string()),
        }
    }
}

/// Convert authorization errors to API errors
impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::MissingPermission(_) | AuthzError::NotAssigned(_) => {
                ApiError::Forbidden(err.to_string())
            }
            AuthzError::NotFound(_) => ApiError::NotFound(err.to_string()),
            AuthzError::UnknownUsers(ref ids) => {
                let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
                ApiError::invalid("user_ids", format!("Unknown users: {}", ids.join(", ")))
            }
            AuthzError::DatabaseError(e) => ApiError::from(e),
        }
    }
}

/// Convert password errors to API errors
impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::Weak(message) => ApiError::invalid("password", message),
            other => ApiError::InternalError(format!("Password operation failed: {}", other)),
        }
    }
}

/// Convert JWT errors to API errors
impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => ApiError::Unauthorized("Token expired".to_string()),
            JwtError::CreateError(msg) => ApiError::InternalError(format!("Token creation failed: {}", msg)),
            other => ApiError::Unauthorized(format!("Invalid token: {}", other)),
        }
    }
}

impl From<TransferError> for ApiError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::UnsupportedFormat(_) => ApiError::BadRequest(err.to_string()),
            TransferError::EmptySheet | TransferError::MissingColumns(_) => {
                ApiError::invalid("file", err.to_string())
            }
            TransferError::Csv(_) | TransferError::Workbook(_) => ApiError::BadRequest(err.to_string()),
            TransferError::WorkbookWrite(e) => {
                ApiError::InternalError(format!("Failed to write workbook: {}", e))
            }
            TransferError::Database(e) => ApiError::from(e),
        }
    }
}

impl From<MailError> for ApiError {
    fn from(err: MailError) -> Self {
        match err {
            MailError::InvalidRecipient(_) => ApiError::invalid("email", err.to_string()),
            MailError::Delivery(msg) => ApiError::ServiceUnavailable(format!("Mail delivery failed: {}", msg)),
        }
    }
}

/// Convert validator errors to API errors
impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut errors: Vec<ValidationErrorDetail> = err
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Validation failed".to_string()),
                })
            })
            .collect();

        errors.sort_by(|a, b| a.field.cmp(&b.field));
        ApiError::ValidationError(errors)
    }
}

/// Malformed JSON bodies answer in the same error format
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ApiError::BadRequest("Invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: Invalid input");

        let err = ApiError::NotFound("User not found".to_string());
        assert_eq!(err.to_string(), "Not found: User not found");
    }

    #[test]
    fn test_validation_error() {
        let errors = vec![
            ValidationErrorDetail::new("email", "Invalid email format"),
            ValidationErrorDetail::new("password", "Password too short"),
        ];

        let err = ApiError::ValidationError(errors);
        assert_eq!(err.to_string(), "Validation failed: 2 errors");
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (ApiError::Unauthorized(String::new()), StatusCode::UNAUTHORIZED),
            (ApiError::Forbidden(String::new()), StatusCode::FORBIDDEN),
            (ApiError::Conflict(String::new()), StatusCode::CONFLICT),
            (ApiError::PayloadTooLarge(String::new()), StatusCode::PAYLOAD_TOO_LARGE),
            (ApiError::InternalError(String::new()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_row_not_found_is_404() {
        let err = ApiError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn test_authz_mapping_hides_other_tenants() {
        assert!(matches!(
            ApiError::from(AuthzError::NotFound("Project")),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(AuthzError::NotAssigned("module")),
            ApiError::Forbidden(_)
        ));
        assert!(matches!(
            ApiError::from(AuthzError::UnknownUsers(vec![uuid::Uuid::nil()])),
            ApiError::ValidationError(_)
        ));
    }

    #[test]
    fn test_transfer_mapping() {
        assert!(matches!(
            ApiError::from(TransferError::MissingColumns(vec!["Title"])),
            ApiError::ValidationError(_)
        ));
        assert!(matches!(
            ApiError::from(TransferError::UnsupportedFormat("ods".to_string())),
            ApiError::BadRequest(_)
        ));
    }

    #[test]
    fn test_weak_password_is_validation_error() {
        let err = ApiError::from(PasswordError::Weak("too short".to_string()));
        match err {
            ApiError::ValidationError(details) => assert_eq!(details[0].field, "password"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
