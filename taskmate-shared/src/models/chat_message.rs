/// Persisted chat messages
///
/// History is paged newest-first by id. The cursor handed to clients is the
/// id of the oldest message in a page; the next page holds strictly smaller
/// ids.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "chat_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: i32,
    pub user_id: i32,
    pub content: String,
    pub role: ChatRole,
    pub created_at: DateTime<Utc>,
    pub context_id: Option<String>,
    pub metadata: Option<String>,
}

impl ChatMessage {
    pub async fn create(
        pool: &PgPool,
        user_id: i32,
        role: ChatRole,
        content: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ChatMessage>(
            r#"
            INSERT INTO chat_messages (user_id, role, content)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, content, role, created_at, context_id, metadata
            "#,
        )
        .bind(user_id)
        .bind(role)
        .bind(content)
        .fetch_one(pool)
        .await
    }

    /// One page of history, newest first
    ///
    /// Fetches `limit + 1` rows to learn whether an older page exists.
    /// Returns `(messages, has_more)`.
    pub async fn page_for_user(
        pool: &PgPool,
        user_id: i32,
        before_id: Option<i32>,
        limit: i64,
    ) -> Result<(Vec<Self>, bool), sqlx::Error> {
        let mut messages = sqlx::query_as::<_, ChatMessage>(
            r#"
            SELECT id, user_id, content, role, created_at, context_id, metadata
            FROM chat_messages
            WHERE user_id = $1 AND ($2::INTEGER IS NULL OR id < $2)
            ORDER BY id DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(before_id)
        .bind(limit + 1)
        .fetch_all(pool)
        .await?;

        let has_more = messages.len() as i64 > limit;
        messages.truncate(limit.max(0) as usize);

        Ok((messages, has_more))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_role_serialization() {
        assert_eq!(serde_json::to_string(&ChatRole::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::from_str::<ChatRole>("\"assistant\"").unwrap(),
            ChatRole::Assistant
        );
        assert_eq!(ChatRole::Assistant.as_str(), "assistant");
    }
}
