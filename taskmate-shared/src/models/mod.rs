/// Database models for Taskmate
///
/// Each model owns its SQL. Identity tables (`users`, `accounts`, `profiles`,
/// token tables, `chat_messages`) use `SERIAL` keys; tasks and subtasks use
/// text keys generated from UUID v4.
///
/// # Models
///
/// - `user`: Identity anchor, owns everything else
/// - `account`: Authentication method bound 1:1 to a user
/// - `profile`: Display name, avatar and bio, 1:1 with a user
/// - `session`: Opaque login sessions with expiry
/// - `token`: Magic links, password reset and email verification tokens
/// - `task` / `subtask`: The task list
/// - `chat_message`: Persisted assistant conversation
///
/// # Example
///
/// ```no_run
/// use taskmate_shared::models::task::{CreateTask, Priority, Task};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool, user_id: i32) -> Result<(), sqlx::Error> {
/// let task = Task::create(&pool, user_id, CreateTask {
///     title: "Buy milk".to_string(),
///     priority: Priority::High,
///     due_date: None,
///     due_time: Some("18:00".to_string()),
/// }).await?;
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Deserializer};

pub mod account;
pub mod chat_message;
pub mod profile;
pub mod session;
pub mod subtask;
pub mod task;
pub mod token;
pub mod user;

/// Deserializes a present field (including `null`) as `Some(..)`
///
/// Used with `#[serde(default)]` so PATCH bodies can tell "absent" (`None`)
/// from "clear this field" (`Some(None)`).
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
