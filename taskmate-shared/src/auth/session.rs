/// Opaque session management
///
/// A login issues a random bearer token; the database keeps its SHA-256 as
/// the session id. Validation hashes the presented token, loads the session,
/// rejects expired ones and slides the expiry forward once less than half of
/// the lifetime remains.
///
/// # Example
///
/// ```no_run
/// use chrono::Duration;
/// use taskmate_shared::auth::session::{create_session, validate_session};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let ttl = Duration::days(30);
/// let issued = create_session(&pool, 42, ttl).await?;
///
/// let auth = validate_session(&pool, &issued.token, ttl).await?;
/// assert_eq!(auth.user_id, 42);
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::debug;

use super::token::{generate_session_token, hash_token, is_session_token};
use crate::models::session::Session;

/// Default session lifetime
pub const DEFAULT_SESSION_TTL_DAYS: i64 = 30;

/// Identity attached to an authenticated request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: i32,

    /// Session id (token hash), used for logout
    pub session_id: String,
}

/// A freshly issued session
#[derive(Debug, Clone)]
pub struct IssuedSession {
    /// Bearer token for the client; not recoverable later
    pub token: String,
    pub user_id: i32,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Malformed session token")]
    Malformed,

    #[error("Session not found")]
    NotFound,

    #[error("Session expired")]
    Expired,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Creates a session for `user_id` valid for `ttl`
pub async fn create_session(
    pool: &PgPool,
    user_id: i32,
    ttl: Duration,
) -> Result<IssuedSession, sqlx::Error> {
    let (token, hash) = generate_session_token();
    let session = Session::create(pool, &hash, user_id, Utc::now() + ttl).await?;

    debug!(user_id = user_id, "Session created");

    Ok(IssuedSession {
        token,
        user_id,
        expires_at: session.expires_at,
    })
}

/// Returns the new expiry if a session should be extended at `now`
pub fn sliding_expiry(
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Option<DateTime<Utc>> {
    (expires_at - now < ttl / 2).then(|| now + ttl)
}

/// Resolves a bearer token to an [`AuthContext`]
///
/// Expired sessions are deleted on sight.
pub async fn validate_session(
    pool: &PgPool,
    token: &str,
    ttl: Duration,
) -> Result<AuthContext, SessionError> {
    if !is_session_token(token) {
        return Err(SessionError::Malformed);
    }

    let hash = hash_token(token);
    let session = Session::find_by_id(pool, &hash)
        .await?
        .ok_or(SessionError::NotFound)?;

    let now = Utc::now();
    if session.is_expired(now) {
        Session::delete(pool, &session.id).await?;
        return Err(SessionError::Expired);
    }

    if let Some(new_expiry) = sliding_expiry(session.expires_at, now, ttl) {
        Session::extend(pool, &session.id, new_expiry).await?;
        debug!(user_id = session.user_id, "Session extended");
    }

    Ok(AuthContext {
        user_id: session.user_id,
        session_id: session.id,
    })
}

/// Deletes a session (logout)
pub async fn invalidate_session(pool: &PgPool, session_id: &str) -> Result<bool, sqlx::Error> {
    Session::delete(pool, session_id).await
}
