/// Session token generation and validation
///
/// Sessions are HS256-signed JWTs. The access token travels in an HttpOnly
/// cookie (or an `Authorization: Bearer` header for API clients); the refresh
/// token is set in a second cookie scoped to the refresh endpoint.
///
/// # Token Types
///
/// - **Access Token**: 24 hours, authenticates API requests
/// - **Refresh Token**: 30 days, exchanged for a new access token
///
/// Claims carry the user and their organization. Roles are deliberately not
/// embedded: they are loaded per request so that a role change applies
/// immediately.
///
/// # Example
///
/// ```
/// use tcm_shared::auth::jwt::{create_token, validate_access_token, Claims, TokenType};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let user_id = Uuid::new_v4();
/// let organization_id = Uuid::new_v4();
///
/// let claims = Claims::new(user_id, organization_id, TokenType::Access);
/// let token = create_token(&claims, "a-secret-of-at-least-thirty-two-bytes")?;
///
/// let validated = validate_access_token(&token, "a-secret-of-at-least-thirty-two-bytes")?;
/// assert_eq!(validated.sub, user_id);
/// assert_eq!(validated.organization_id, organization_id);
/// # Ok(())
/// # }
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Issuer written into and required from every token
pub const ISSUER: &str = "tcm";

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to create token: {0}")]
    CreateError(String),

    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    #[error("Token has expired")]
    Expired,

    #[error("Wrong token type: expected {expected}")]
    WrongType { expected: &'static str },
}

/// Token type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    /// Gets default lifetime for the token type
    pub fn default_expiration(&self) -> Duration {
        match self {
            TokenType::Access => Duration::hours(24),
            TokenType::Refresh => Duration::days(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

/// JWT claims
///
/// Standard claims `sub` (user ID), `iss`, `iat`, `exp`, `nbf`, plus the
/// user's `organization_id` and the `token_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,

    pub iss: String,

    pub iat: i64,

    pub exp: i64,

    pub nbf: i64,

    pub organization_id: Uuid,

    pub token_type: TokenType,
}

impl Claims {
    /// Creates claims with the default lifetime for `token_type`
    pub fn new(user_id: Uuid, organization_id: Uuid, token_type: TokenType) -> Self {
        Self::with_expiration(user_id, organization_id, token_type, token_type.default_expiration())
    }

    /// Creates claims expiring `expires_in` from now
    pub fn with_expiration(
        user_id: Uuid,
        organization_id: Uuid,
        token_type: TokenType,
        expires_in: Duration,
    ) -> Self {
        let now = Utc::now();

        Self {
            sub: user_id,
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
            nbf: now.timestamp(),
            organization_id,
            token_type,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }

    /// Seconds until expiry, or None if already expired
    pub fn time_until_expiration(&self) -> Option<Duration> {
        let now = Utc::now().timestamp();
        (self.exp > now).then(|| Duration::seconds(self.exp - now))
    }
}

/// Signs claims with HS256
///
/// # Errors
///
/// Returns `JwtError::CreateError` if encoding fails.
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    let header = Header::new(Algorithm::HS256);
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&header, claims, &key)
        .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
}

/// Validates signature, expiry, not-before and issuer, and returns the claims
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;
    validation.validate_nbf = true;

    let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
        _ => JwtError::ValidationError(format!("Token validation failed: {}", e)),
    })?;

    Ok(token_data.claims)
}

/// Validates a token and requires it to be an access token
pub fn validate_access_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let claims = validate_token(token, secret)?;

    if claims.token_type != TokenType::Access {
        return Err(JwtError::WrongType {
            expected: TokenType::Access.as_str(),
        });
    }

    Ok(claims)
}

/// Validates a token and requires it to be a refresh token
pub fn validate_refresh_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let claims = validate_token(token, secret)?;

    if claims.token_type != TokenType::Refresh {
        return Err(JwtError::WrongType {
            expected: TokenType::Refresh.as_str(),
        });
    }

    Ok(claims)
}

/// Issues an access and a refresh token for a user
///
/// Returns `(access_token, refresh_token)`.
pub fn issue_session(
    user_id: Uuid,
    organization_id: Uuid,
    secret: &str,
) -> Result<(String, String), JwtError> {
    let access = create_token(&Claims::new(user_id, organization_id, TokenType::Access), secret)?;
    let refresh = create_token(&Claims::new(user_id, organization_id, TokenType::Refresh), secret)?;

    Ok((access, refresh))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    #[test]
    fn test_token_type_expiration() {
        assert_eq!(TokenType::Access.default_expiration(), Duration::hours(24));
        assert_eq!(TokenType::Refresh.default_expiration(), Duration::days(30));
    }

    #[test]
    fn test_claims_creation() {
        let user_id = Uuid::new_v4();
        let organization_id = Uuid::new_v4();

        let claims = Claims::new(user_id, organization_id, TokenType::Access);

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.organization_id, organization_id);
        assert_eq!(claims.iss, "tcm");
        assert!(!claims.is_expired());
    }

    #[test]
    fn test_claims_with_custom_expiration() {
        let claims = Claims::with_expiration(
            Uuid::new_v4(),
            Uuid::new_v4(),
            TokenType::Access,
            Duration::hours(1),
        );

        let time_left = claims.time_until_expiration().unwrap();
        assert!(time_left.num_seconds() > 3500);
        assert!(time_left.num_seconds() <= 3600);
    }

    #[test]
    fn test_create_and_validate_token() {
        let user_id = Uuid::new_v4();
        let organization_id = Uuid::new_v4();

        let claims = Claims::new(user_id, organization_id, TokenType::Access);
        let token = create_token(&claims, SECRET).unwrap();

        let validated = validate_token(&token, SECRET).unwrap();
        assert_eq!(validated.sub, user_id);
        assert_eq!(validated.organization_id, organization_id);
        assert_eq!(validated.token_type, TokenType::Access);
    }

    #[test]
    fn test_validate_with_wrong_secret() {
        let claims = Claims::new(Uuid::new_v4(), Uuid::new_v4(), TokenType::Access);
        let token = create_token(&claims, SECRET).unwrap();

        assert!(validate_token(&token, "another-secret-key-at-least-32-bytes").is_err());
    }

    #[test]
    fn test_validate_expired_token() {
        let claims = Claims::with_expiration(
            Uuid::new_v4(),
            Uuid::new_v4(),
            TokenType::Access,
            Duration::seconds(-3600),
        );

        assert!(claims.is_expired());
        assert!(claims.time_until_expiration().is_none());

        let token = create_token(&claims, SECRET).unwrap();
        assert!(matches!(validate_token(&token, SECRET), Err(JwtError::Expired)));
    }

    #[test]
    fn test_token_type_is_enforced() {
        let (access, refresh) = issue_session(Uuid::new_v4(), Uuid::new_v4(), SECRET).unwrap();

        assert!(validate_access_token(&access, SECRET).is_ok());
        assert!(validate_refresh_token(&refresh, SECRET).is_ok());

        assert!(matches!(
            validate_access_token(&refresh, SECRET),
            Err(JwtError::WrongType { expected: "access" })
        ));
        assert!(matches!(
            validate_refresh_token(&access, SECRET),
            Err(JwtError::WrongType { expected: "refresh" })
        ));
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        assert!(matches!(
            validate_token("not.a.jwt", SECRET),
            Err(JwtError::ValidationError(_))
        ));
    }
}
