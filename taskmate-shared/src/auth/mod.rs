/// Authentication primitives
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and strength checks
/// - [`token`]: Random opaque tokens and their SHA-256 digests
/// - [`session`]: Session issue, validation and logout
///
/// Only token digests are persisted. Sessions are looked up by the hash of
/// the presented bearer token, and email tokens are redeemed the same way.

pub mod password;
pub mod session;
pub mod token;
