/// Single-use email tokens
///
/// Three tables share one shape: a token hash with an expiry. Magic links
/// are keyed by email (the user may not exist yet); reset and verification
/// tokens are keyed by user. Issuing a new token replaces the previous one,
/// and redeeming deletes it, so each token works at most once.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Kind of user-bound token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserTokenKind {
    PasswordReset,
    EmailVerification,
}

impl UserTokenKind {
    fn table(&self) -> &'static str {
        match self {
            UserTokenKind::PasswordReset => "reset_tokens",
            UserTokenKind::EmailVerification => "verify_email_tokens",
        }
    }
}

/// Password reset / email verification token storage
pub struct UserToken;

impl UserToken {
    /// Stores a token hash for a user, replacing any earlier one
    pub async fn issue(
        pool: &PgPool,
        kind: UserTokenKind,
        user_id: i32,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        let query = format!(
            "INSERT INTO {} (user_id, token_hash, token_expires_at) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id) DO UPDATE \
             SET token_hash = EXCLUDED.token_hash, token_expires_at = EXCLUDED.token_expires_at",
            kind.table()
        );

        sqlx::query(&query)
            .bind(user_id)
            .bind(token_hash)
            .bind(expires_at)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Deletes the token and returns its user if it had not expired
    pub async fn redeem(
        pool: &PgPool,
        kind: UserTokenKind,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<i32>, sqlx::Error> {
        let query = format!(
            "DELETE FROM {} WHERE token_hash = $1 RETURNING user_id, token_expires_at",
            kind.table()
        );

        let row: Option<(i32, DateTime<Utc>)> = sqlx::query_as(&query)
            .bind(token_hash)
            .fetch_optional(pool)
            .await?;

        Ok(row.and_then(|(user_id, expires_at)| (expires_at > now).then_some(user_id)))
    }
}

/// Magic-link token storage
pub struct MagicLink;

impl MagicLink {
    pub async fn issue(
        pool: &PgPool,
        email: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO magic_links (email, token_hash, token_expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE
            SET token_hash = EXCLUDED.token_hash, token_expires_at = EXCLUDED.token_expires_at
            "#,
        )
        .bind(email)
        .bind(token_hash)
        .bind(expires_at)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Deletes the link and returns its email if it had not expired
    pub async fn redeem(
        pool: &PgPool,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(String, DateTime<Utc>)> = sqlx::query_as(
            "DELETE FROM magic_links WHERE token_hash = $1 RETURNING email, token_expires_at",
        )
        .bind(token_hash)
        .fetch_optional(pool)
        .await?;

        Ok(row.and_then(|(email, expires_at)| (expires_at > now).then_some(email)))
    }
}
