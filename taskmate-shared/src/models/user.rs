/// User model and database operations
///
/// The user row is the identity anchor. Accounts, profiles, sessions,
/// tokens, tasks and chat messages all reference it with
/// `ON DELETE CASCADE`, so deleting a user removes everything they own.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id SERIAL PRIMARY KEY,
///     email TEXT UNIQUE,
///     email_verified TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// `email` is nullable because an OAuth provider may not disclose one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgExecutor, PgPool};

/// User model
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Surrogate key
    pub id: i32,

    /// Email address, stored lowercase
    pub email: Option<String>,

    /// When the email address was verified (None if never)
    pub email_verified: Option<DateTime<Utc>>,

    /// When the user was created
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether the user has verified their email address
    pub fn is_verified(&self) -> bool {
        self.email_verified.is_some()
    }

    /// Creates a user
    ///
    /// Accepts any executor so registration can run inside a transaction
    /// together with the account and profile inserts.
    ///
    /// # Errors
    ///
    /// Fails with a unique violation on `users_email_key` if the email is taken.
    pub async fn create<'e, E>(
        executor: E,
        email: Option<&str>,
        email_verified: Option<DateTime<Utc>>,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, email_verified)
            VALUES ($1, $2)
            RETURNING id, email, email_verified, created_at
            "#,
        )
        .bind(email.map(normalize_email))
        .bind(email_verified)
        .fetch_one(executor)
        .await
    }

    /// Finds a user by ID
    pub async fn find_by_id(pool: &PgPool, id: i32) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT id, email, email_verified, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Finds a user by email (case-insensitive)
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT id, email, email_verified, created_at FROM users WHERE email = $1",
        )
        .bind(normalize_email(email))
        .fetch_optional(pool)
        .await
    }

    /// Stamps `email_verified` with the current time
    pub async fn mark_email_verified(pool: &PgPool, id: i32) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET email_verified = NOW() WHERE id = $1 AND email_verified IS NULL",
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes a user and, through cascades, everything they own
    pub async fn delete(pool: &PgPool, id: i32) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Lowercases and trims an email address for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
