/// Account model: how a user authenticates
///
/// Exactly one account per user (`user_id UNIQUE`). Email accounts carry an
/// Argon2id hash (absent for magic-link-only users); OAuth accounts carry the
/// provider's stable user id.

use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgExecutor, PgPool};
use std::fmt;
use std::str::FromStr;

/// Authentication method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "account_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Email,
    Google,
    Github,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Email => "email",
            AccountType::Google => "google",
            AccountType::Github => "github",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "email" => Ok(AccountType::Email),
            "google" => Ok(AccountType::Google),
            "github" => Ok(AccountType::Github),
            _ => Err(format!("Unknown account type: {}", s)),
        }
    }
}

/// Account model
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Account {
    pub id: i32,
    pub user_id: i32,
    pub account_type: AccountType,
    pub github_id: Option<String>,
    pub google_id: Option<String>,
    /// Never serialized; only read for password verification
    pub password_hash: Option<String>,
}

impl Account {
    /// Creates an email account, optionally with a password hash
    pub async fn create_email<'e, E>(
        executor: E,
        user_id: i32,
        password_hash: Option<String>,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (user_id, account_type, password_hash)
            VALUES ($1, 'email', $2)
            RETURNING id, user_id, account_type, github_id, google_id, password_hash
            "#,
        )
        .bind(user_id)
        .bind(password_hash)
        .fetch_one(executor)
        .await
    }

    /// Creates an OAuth account bound to a provider user id
    pub async fn create_oauth<'e, E>(
        executor: E,
        user_id: i32,
        provider: AccountType,
        provider_id: &str,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let (github_id, google_id) = match provider {
            AccountType::Github => (Some(provider_id), None),
            AccountType::Google => (None, Some(provider_id)),
            AccountType::Email => (None, None),
        };

        sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (user_id, account_type, github_id, google_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, account_type, github_id, google_id, password_hash
            "#,
        )
        .bind(user_id)
        .bind(provider)
        .bind(github_id)
        .bind(google_id)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_user_id(pool: &PgPool, user_id: i32) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Account>(
            r#"
            SELECT id, user_id, account_type, github_id, google_id, password_hash
            FROM accounts
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Finds the account linked to an OAuth provider's user id
    pub async fn find_by_provider_id(
        pool: &PgPool,
        provider: AccountType,
        provider_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let column = match provider {
            AccountType::Github => "github_id",
            AccountType::Google => "google_id",
            AccountType::Email => return Ok(None),
        };

        let query = format!(
            "SELECT id, user_id, account_type, github_id, google_id, password_hash \
             FROM accounts WHERE {} = $1",
            column
        );

        sqlx::query_as::<_, Account>(&query)
            .bind(provider_id)
            .fetch_optional(pool)
            .await
    }

    /// Replaces the password hash (password reset)
    pub async fn update_password(
        pool: &PgPool,
        user_id: i32,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE accounts SET password_hash = $2 WHERE user_id = $1 AND account_type = 'email'",
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_type_parsing() {
        assert_eq!("google".parse::<AccountType>().unwrap(), AccountType::Google);
        assert_eq!("GitHub".parse::<AccountType>().unwrap(), AccountType::Github);
        assert!("twitter".parse::<AccountType>().is_err());
    }

    #[test]
    fn test_account_type_serialization() {
        assert_eq!(
            serde_json::to_string(&AccountType::Github).unwrap(),
            "\"github\""
        );
        assert_eq!(AccountType::Email.to_string(), "email");
    }
}
