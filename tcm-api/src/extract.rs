/// Request extractors answering with `ApiError` bodies

use axum::extract::{FromRequest, Request};
use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use validator::Validate;

use crate::error::{ApiError, ApiResult};

/// `Json<T>` whose rejection is an `ApiError`
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl<T: Validate> ApiJson<T> {
    /// Runs the `validator` rules and unwraps the payload
    pub fn validated(self) -> ApiResult<T> {
        self.0.validate()?;
        Ok(self.0)
    }
}

/// JSON body that may be left out entirely
///
/// An empty (or all-whitespace) body yields `None`. Anything else must be
/// valid JSON for `T`; a bad body is rejected instead of being ignored.
#[derive(Debug)]
pub struct OptionalJson<T>(pub Option<T>);

impl<T: Default> OptionalJson<T> {
    pub fn or_default(self) -> T {
        self.0.unwrap_or_default()
    }
}

#[axum::async_trait]
impl<T, S> FromRequest<S> for OptionalJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(OptionalJson(None));
        }

        let axum::Json(value) = axum::Json::<T>::from_bytes(&body)?;
        Ok(OptionalJson(Some(value)))
    }
}

/// Trims a required text field, rejecting blank values
pub fn required_text(field: &str, value: &str) -> ApiResult<String> {
    let value = value.trim();

    if value.is_empty() {
        Err(ApiError::invalid(field, format!("{} must not be blank", field)))
    } else {
        Ok(value.to_string())
    }
}

/// Trims optional text, treating blank as absent
pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Deserializes a field that distinguishes "absent" from `null`
///
/// Use with `#[serde(default, deserialize_with = "double_option")]`: a missing
/// key stays `None`, `null` becomes `Some(None)`.
pub fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
