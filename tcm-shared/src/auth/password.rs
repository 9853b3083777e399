/// Password hashing with Argon2id
///
/// Parameters: 64 MB memory, 3 iterations, 4 lanes, 32-byte output, 16-byte
/// random salt. Hashes are stored in PHC string format, so the parameters
/// travel with the hash and verification works even if they change later.
///
/// # Example
///
/// ```
/// use tcm_shared::auth::password::{hash_password, verify_password};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("Tr1cky-enough")?;
/// assert!(verify_password("Tr1cky-enough", &hash)?);
/// assert!(!verify_password("wrong", &hash)?);
/// # Ok(())
/// # }
/// ```

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, ParamsBuilder, Version,
};

/// Minimum accepted password length (characters)
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum accepted password length, bounding hashing cost
pub const MAX_PASSWORD_LENGTH: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashError(String),

    #[error("Failed to verify password: {0}")]
    VerifyError(String),

    #[error("Invalid password hash format: {0}")]
    InvalidHash(String),

    /// Password doesn't meet the strength policy
    #[error("{0}")]
    Weak(String),
}

fn hasher() -> Result<Argon2<'static>, PasswordError> {
    let params = ParamsBuilder::new()
        .m_cost(65536)
        .t_cost(3)
        .p_cost(4)
        .output_len(32)
        .build()
        .map_err(|e| PasswordError::HashError(format!("Invalid parameters: {}", e)))?;

    Ok(Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params))
}

/// Hashes a password, returning a PHC string (`$argon2id$v=19$m=65536,t=3,p=4$...`)
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashError(format!("Hash generation failed: {}", e)))?;

    Ok(password_hash.to_string())
}

/// Verifies a password against a stored PHC hash
///
/// Returns `Ok(false)` for a wrong password and `Err` only when the stored
/// hash can't be parsed or verification fails for another reason.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| PasswordError::InvalidHash(format!("Failed to parse hash: {}", e)))?;

    // "$argon2id$salt" parses, but there is nothing to compare against
    if parsed_hash.hash.is_none() {
        return Err(PasswordError::InvalidHash("Hash has no output".to_string()));
    }

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerifyError(format!("Verification failed: {}", e))),
    }
}

/// Checks a new password against the strength policy
///
/// 8 to 128 characters with at least one uppercase letter, one lowercase
/// letter and one digit.
pub fn validate_password_strength(password: &str) -> Result<(), PasswordError> {
    let length = password.chars().count();

    if length < MIN_PASSWORD_LENGTH {
        return Err(PasswordError::Weak(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LENGTH
        )));
    }

    if length > MAX_PASSWORD_LENGTH {
        return Err(PasswordError::Weak(format!(
            "Password must be at most {} characters long",
            MAX_PASSWORD_LENGTH
        )));
    }

    if !password.chars().any(|c| c.is_uppercase()) {
        return Err(PasswordError::Weak(
            "Password must contain at least one uppercase letter".to_string(),
        ));
    }

    if !password.chars().any(|c| c.is_lowercase()) {
        return Err(PasswordError::Weak(
            "Password must contain at least one lowercase letter".to_string(),
        ));
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(PasswordError::Weak(
            "Password must contain at least one digit".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password_parameters() {
        let hash = hash_password("test_password_123").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hash.contains("v=19"));
        assert!(hash.contains("m=65536"));
        assert!(hash.contains("t=3"));
        assert!(hash.contains("p=4"));
    }

    #[test]
    fn test_hash_password_uses_random_salt() {
        let hash1 = hash_password("same_password").unwrap();
        let hash2 = hash_password("same_password").unwrap();

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_verify_password() {
        let hash = hash_password("correct_password").unwrap();

        assert!(verify_password("correct_password", &hash).unwrap());
        assert!(!verify_password("wrong_password", &hash).unwrap());
        assert!(!verify_password("", &hash).unwrap());
    }

    #[test]
    fn test_verify_password_invalid_hash() {
        assert!(matches!(
            verify_password("password", "invalid_hash"),
            Err(PasswordError::InvalidHash(_))
        ));
        assert!(matches!(
            verify_password("password", "$argon2id$invalid"),
            Err(PasswordError::InvalidHash(_))
        ));
    }

    #[test]
    fn test_unicode_password_roundtrip() {
        let hash = hash_password("unicode-密码-パスワード").unwrap();
        assert!(verify_password("unicode-密码-パスワード", &hash).unwrap());
    }

    #[test]
    fn test_validate_password_strength() {
        assert!(validate_password_strength("Passw0rd").is_ok());
        assert!(validate_password_strength("Str0ng!Pass").is_ok());

        let cases = [
            ("Sh0rt", "at least 8"),
            ("lowercase1", "uppercase"),
            ("UPPERCASE1", "lowercase"),
            ("NoDigitsHere", "digit"),
        ];

        for (password, message) in cases {
            match validate_password_strength(password) {
                Err(PasswordError::Weak(reason)) => assert!(
                    reason.contains(message),
                    "'{}' rejected with '{}'",
                    password,
                    reason
                ),
                other => panic!("'{}' should be weak, got {:?}", password, other),
            }
        }
    }

    #[test]
    fn test_validate_password_strength_too_long() {
        let password = format!("Aa1{}", "x".repeat(MAX_PASSWORD_LENGTH));
        assert!(matches!(
            validate_password_strength(&password),
            Err(PasswordError::Weak(_))
        ));
    }
}
