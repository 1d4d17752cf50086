/// Subtask model
///
/// Subtasks have no `user_id` of their own; ownership is checked by joining
/// through the parent task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgExecutor, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subtask {
    pub id: String,
    pub task_id: String,
    pub title: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateSubtask {
    pub title: Option<String>,
    pub completed: Option<bool>,
}

impl Subtask {
    /// Adds a subtask to a task the caller has already verified ownership of
    ///
    /// Stamped with `clock_timestamp()` rather than `NOW()` so subtasks
    /// inserted in one transaction keep their insertion order.
    pub async fn create<'e, E>(executor: E, task_id: &str, title: &str) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Subtask>(
            r#"
            INSERT INTO subtasks (id, task_id, title, created_at, updated_at)
            VALUES ($1, $2, $3, clock_timestamp(), clock_timestamp())
            RETURNING id, task_id, title, completed, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(task_id)
        .bind(title.trim())
        .fetch_one(executor)
        .await
    }

    pub async fn list_for_task(pool: &PgPool, task_id: &str) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Subtask>(
            r#"
            SELECT id, task_id, title, completed, created_at, updated_at
            FROM subtasks
            WHERE task_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(task_id)
        .fetch_all(pool)
        .await
    }

    pub async fn list_for_tasks(
        pool: &PgPool,
        task_ids: &[String],
    ) -> Result<Vec<Self>, sqlx::Error> {
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, Subtask>(
            r#"
            SELECT id, task_id, title, completed, created_at, updated_at
            FROM subtasks
            WHERE task_id = ANY($1)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(task_ids)
        .fetch_all(pool)
        .await
    }

    /// Updates a subtask if its parent task belongs to `user_id`
    pub async fn update(
        pool: &PgPool,
        id: &str,
        user_id: i32,
        data: UpdateSubtask,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Subtask>(
            r#"
            UPDATE subtasks s
            SET title = COALESCE($3, s.title),
                completed = COALESCE($4, s.completed),
                updated_at = NOW()
            FROM tasks t
            WHERE s.id = $1 AND s.task_id = t.id AND t.user_id = $2
            RETURNING s.id, s.task_id, s.title, s.completed, s.created_at, s.updated_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(data.title.map(|t| t.trim().to_string()))
        .bind(data.completed)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: &str, user_id: i32) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM subtasks s
            USING tasks t
            WHERE s.id = $1 AND s.task_id = t.id AND t.user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
