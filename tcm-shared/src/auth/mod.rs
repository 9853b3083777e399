/// Authentication and authorization utilities
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and strength policy
/// - [`jwt`]: session token generation and validation
/// - [`token`]: one-time tokens for invitations and email verification
/// - [`middleware`]: session extraction, `AuthContext`, cookie helpers
/// - [`authorization`]: role permissions and hierarchy access checks
///
/// # Example
///
/// ```no_run
/// use tcm_shared::auth::password::{hash_password, verify_password};
/// use tcm_shared::auth::jwt::issue_session;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("Passw0rd")?;
/// assert!(verify_password("Passw0rd", &hash)?);
///
/// let (access, refresh) = issue_session(Uuid::new_v4(), Uuid::new_v4(), "a-secret-of-at-least-thirty-two-bytes")?;
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod token;
