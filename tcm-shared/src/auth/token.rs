/// One-time token utilities
///
/// Invitations and email verifications are confirmed with a random token sent
/// by mail. Only the SHA-256 hash of a token is stored; the plaintext exists
/// in the mail (and, for invitations, in the response to the inviting admin).
///
/// # Token Format
///
/// `{prefix}_{40 chars}` where the prefix names the purpose (`inv`, `ver`) and
/// the random part is base62 (`[A-Za-z0-9]`), so tokens are URL-safe.
///
/// # Example
///
/// ```
/// use tcm_shared::auth::token::{generate_token, hash_token, validate_token_format, TokenKind};
///
/// let (token, hash) = generate_token(TokenKind::Invitation);
/// assert!(token.starts_with("inv_"));
/// assert!(validate_token_format(TokenKind::Invitation, &token));
/// assert!(!validate_token_format(TokenKind::EmailVerification, &token));
/// assert_eq!(hash_token(&token), hash);
/// ```

use rand::Rng;
use sha2::{Digest, Sha256};

/// Length of the random part of a token (characters)
const TOKEN_RANDOM_LENGTH: usize = 40;

/// Purpose of a one-time token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Invitation,
    EmailVerification,
}

impl TokenKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            TokenKind::Invitation => "inv_",
            TokenKind::EmailVerification => "ver_",
        }
    }
}

/// Generates a token for the given purpose
///
/// Returns `(plaintext_token, sha256_hex_hash)`.
pub fn generate_token(kind: TokenKind) -> (String, String) {
    let token = format!("{}{}", kind.prefix(), generate_random_string(TOKEN_RANDOM_LENGTH));
    let hash = hash_token(&token);

    (token, hash)
}

fn generate_random_string(length: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();

    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Hashes a token with SHA-256, hex encoded (64 characters)
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.trim().as_bytes());
    hex::encode(hasher.finalize())
}

/// Checks the prefix, length and alphabet of a token
///
/// Lets handlers reject garbage before touching the database.
pub fn validate_token_format(kind: TokenKind, token: &str) -> bool {
    let Some(random_part) = token.trim().strip_prefix(kind.prefix()) else {
        return false;
    };

    random_part.len() == TOKEN_RANDOM_LENGTH && random_part.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Checks a plaintext token against a stored hash in constant time
pub fn verify_token(token: &str, stored_hash: &str) -> bool {
    constant_time_compare(&hash_token(token), stored_hash)
}

/// Constant-time string comparison
///
/// Compares every byte regardless of where the strings differ.
///
/// ```
/// use tcm_shared::auth::token::constant_time_compare;
///
/// assert!(constant_time_compare("hello", "hello"));
/// assert!(!constant_time_compare("hello", "world"));
/// ```
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
