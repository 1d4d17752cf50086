/// Opaque secret tokens
///
/// Session tokens and the single-use tokens mailed to users (magic links,
/// password resets, email verification) are random base62 strings. Only the
/// SHA-256 of a token is stored, so a leaked table cannot be replayed.
///
/// # Format
///
/// - Session tokens: `tms_` + 40 random characters
/// - Email tokens: 32 random characters (they end up in URLs)
///
/// # Example
///
/// ```
/// use taskmate_shared::auth::token::{generate_session_token, hash_token, is_session_token};
///
/// let (token, hash) = generate_session_token();
/// assert!(is_session_token(&token));
/// assert_eq!(hash_token(&token), hash);
/// ```

use rand::Rng;
use sha2::{Digest, Sha256};

const SESSION_PREFIX: &str = "tms_";
const SESSION_RANDOM_LENGTH: usize = 40;
const EMAIL_TOKEN_LENGTH: usize = 32;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Total length of a session token
pub const SESSION_TOKEN_LENGTH: usize = SESSION_PREFIX.len() + SESSION_RANDOM_LENGTH;

fn random_string(length: usize) -> String {
    let mut rng = rand::thread_rng();

    (0..length)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Generates a session token, returning `(plaintext, sha256_hex)`
pub fn generate_session_token() -> (String, String) {
    let token = format!("{}{}", SESSION_PREFIX, random_string(SESSION_RANDOM_LENGTH));
    let hash = hash_token(&token);
    (token, hash)
}

/// Generates a single-use email token, returning `(plaintext, sha256_hex)`
pub fn generate_email_token() -> (String, String) {
    let token = random_string(EMAIL_TOKEN_LENGTH);
    let hash = hash_token(&token);
    (token, hash)
}

/// Hex-encoded SHA-256 of a token
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Cheap shape check before touching the database
pub fn is_session_token(token: &str) -> bool {
    token.len() == SESSION_TOKEN_LENGTH
        && token
            .strip_prefix(SESSION_PREFIX)
            .is_some_and(|rest| rest.bytes().all(|b| b.is_ascii_alphanumeric()))
}
