/// Task model and database operations
///
/// Tasks belong to a single user and are addressed by text ids (UUID v4
/// strings). Every query is scoped by `user_id`, so a task id alone never
/// grants access.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE task_priority AS ENUM ('Low', 'Medium', 'High', 'Urgent');
///
/// CREATE TABLE tasks (
///     id VARCHAR(64) PRIMARY KEY,
///     user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     title TEXT NOT NULL,
///     completed BOOLEAN NOT NULL DEFAULT FALSE,
///     priority task_priority NOT NULL DEFAULT 'Medium',
///     due_date DATE,
///     due_time TEXT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use taskmate_shared::models::task::{Task, TaskFilter, UpdateTask};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool, user_id: i32) -> Result<(), sqlx::Error> {
/// let open = Task::list_for_user(&pool, user_id, &TaskFilter {
///     completed: Some(false),
///     search: None,
/// }).await?;
///
/// if let Some(first) = open.first() {
///     Task::update(&pool, &first.id, user_id, UpdateTask {
///         completed: Some(true),
///         ..Default::default()
///     }).await?;
/// }
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgExecutor, PgPool};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::subtask::Subtask;

/// Task priority
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "task_priority")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Priority::Low, Priority::Medium, Priority::High, Priority::Urgent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Urgent => "Urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    /// Case-insensitive, so model-produced arguments like `"high"` parse
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Invalid priority: {} (expected Low, Medium, High or Urgent)", s))
    }
}

/// Task model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: String,
    pub user_id: i32,
    pub title: String,
    pub completed: bool,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    /// `HH:MM`, 24-hour
    pub due_time: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A task together with its subtasks, as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskWithSubtasks {
    #[serde(flatten)]
    pub task: Task,
    pub subtasks: Vec<Subtask>,
}

/// Input for creating a task
#[derive(Debug, Clone)]
pub struct CreateTask {
    /// Trimmed on insert
    pub title: String,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<String>,
}

/// Partial update; `None` leaves a field unchanged, `Some(None)` clears it
#[derive(Debug, Clone, Default)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
    pub due_date: Option<Option<NaiveDate>>,
    pub due_time: Option<Option<String>>,
}

impl UpdateTask {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.completed.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
            && self.due_time.is_none()
    }
}

/// Listing filter
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub completed: Option<bool>,
    /// Case-insensitive substring match on the title
    pub search: Option<String>,
}

const TASK_COLUMNS: &str =
    "id, user_id, title, completed, priority, due_date, due_time, created_at, updated_at";

/// Checks a `HH:MM` 24-hour time string
pub fn is_valid_due_time(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return false;
    }

    let digits = |s: &str| -> Option<u32> {
        if s.bytes().all(|b| b.is_ascii_digit()) {
            s.parse().ok()
        } else {
            None
        }
    };

    matches!(
        (digits(&value[..2]), digits(&value[3..])),
        (Some(h), Some(m)) if h < 24 && m < 60
    )
}

/// Escapes `%`, `_` and `\` for use inside an `ILIKE` pattern
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl Task {
    /// Creates a task with a fresh UUID v4 id
    pub async fn create<'e, E>(executor: E, user_id: i32, data: CreateTask) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "INSERT INTO tasks (id, user_id, title, priority, due_date, due_time) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            TASK_COLUMNS
        );

        sqlx::query_as::<_, Task>(&query)
            .bind(Uuid::new_v4().to_string())
            .bind(user_id)
            .bind(data.title.trim())
            .bind(data.priority)
            .bind(data.due_date)
            .bind(data.due_time)
            .fetch_one(executor)
            .await
    }

    /// Finds a task owned by `user_id`
    pub async fn find_for_user(
        pool: &PgPool,
        id: &str,
        user_id: i32,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM tasks WHERE id = $1 AND user_id = $2", TASK_COLUMNS);

        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Lists a user's tasks, oldest first
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: i32,
        filter: &TaskFilter,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut query = format!("SELECT {} FROM tasks WHERE user_id = $1", TASK_COLUMNS);
        let mut bind_count = 1;

        if filter.completed.is_some() {
            bind_count += 1;
            query.push_str(&format!(" AND completed = ${}", bind_count));
        }
        if filter.search.is_some() {
            bind_count += 1;
            query.push_str(&format!(" AND title ILIKE ${}", bind_count));
        }

        query.push_str(" ORDER BY created_at ASC, id ASC");

        let mut q = sqlx::query_as::<_, Task>(&query).bind(user_id);

        if let Some(completed) = filter.completed {
            q = q.bind(completed);
        }
        if let Some(search) = &filter.search {
            q = q.bind(format!("%{}%", escape_like(search.trim())));
        }

        q.fetch_all(pool).await
    }

    /// Tasks whose title contains `query` (case-insensitive)
    pub async fn search_by_title(
        pool: &PgPool,
        user_id: i32,
        query: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        Self::list_for_user(
            pool,
            user_id,
            &TaskFilter {
                completed: None,
                search: Some(query.to_string()),
            },
        )
        .await
    }

    /// Applies a partial update, returning `None` if the task doesn't exist
    /// or belongs to another user
    pub async fn update(
        pool: &PgPool,
        id: &str,
        user_id: i32,
        data: UpdateTask,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE tasks SET updated_at = NOW()");
        let mut bind_count = 2;

        if data.title.is_some() {
            bind_count += 1;
            query.push_str(&format!(", title = ${}", bind_count));
        }
        if data.completed.is_some() {
            bind_count += 1;
            query.push_str(&format!(", completed = ${}", bind_count));
        }
        if data.priority.is_some() {
            bind_count += 1;
            query.push_str(&format!(", priority = ${}", bind_count));
        }
        if data.due_date.is_some() {
            bind_count += 1;
            query.push_str(&format!(", due_date = ${}", bind_count));
        }
        if data.due_time.is_some() {
            bind_count += 1;
            query.push_str(&format!(", due_time = ${}", bind_count));
        }

        query.push_str(&format!(
            " WHERE id = $1 AND user_id = $2 RETURNING {}",
            TASK_COLUMNS
        ));

        let mut q = sqlx::query_as::<_, Task>(&query).bind(id).bind(user_id);

        if let Some(title) = data.title {
            q = q.bind(title.trim().to_string());
        }
        if let Some(completed) = data.completed {
            q = q.bind(completed);
        }
        if let Some(priority) = data.priority {
            q = q.bind(priority);
        }
        if let Some(due_date) = data.due_date {
            q = q.bind(due_date);
        }
        if let Some(due_time) = data.due_time {
            q = q.bind(due_time);
        }

        q.fetch_optional(pool).await
    }

    /// Deletes a task (subtasks cascade)
    pub async fn delete(pool: &PgPool, id: &str, user_id: i32) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Loads subtasks for a batch of tasks with a single query
    pub async fn with_subtasks(
        pool: &PgPool,
        tasks: Vec<Task>,
    ) -> Result<Vec<TaskWithSubtasks>, sqlx::Error> {
        let ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
        let mut subtasks = Subtask::list_for_tasks(pool, &ids).await?;

        Ok(tasks
            .into_iter()
            .map(|task| {
                let (mine, rest): (Vec<Subtask>, Vec<Subtask>) =
                    subtasks.drain(..).partition(|s| s.task_id == task.id);
                subtasks = rest;
                TaskWithSubtasks { task, subtasks: mine }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_default_is_medium() {
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn test_priority_parsing() {
        assert_eq!("High".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!("urgent".parse::<Priority>().unwrap(), Priority::Urgent);
        assert_eq!(" low ".parse::<Priority>().unwrap(), Priority::Low);
        assert!("critical".parse::<Priority>().is_err());
    }

    #[test]
    fn test_priority_serialization() {
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"High\"");
        let parsed: Priority = serde_json::from_str("\"Urgent\"").unwrap();
        assert_eq!(parsed, Priority::Urgent);
        assert!(serde_json::from_str::<Priority>("\"high\"").is_err());
    }

    #[test]
    fn test_is_valid_due_time() {
        assert!(is_valid_due_time("18:00"));
        assert!(is_valid_due_time("00:00"));
        assert!(is_valid_due_time("23:59"));
        assert!(!is_valid_due_time("24:00"));
        assert!(!is_valid_due_time("12:60"));
        assert!(!is_valid_due_time("6:00"));
        assert!(!is_valid_due_time("18-00"));
        assert!(!is_valid_due_time("+1:00"));
        assert!(!is_valid_due_time(""));
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("milk"), "milk");
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b\\c"), "a\\_b\\\\c");
    }

    #[test]
    fn test_update_task_is_empty() {
        assert!(UpdateTask::default().is_empty());
        assert!(!UpdateTask {
            due_time: Some(None),
            ..Default::default()
        }
        .is_empty());
    }

    #[test]
    fn test_task_with_subtasks_serializes_flat() {
        let task = Task {
            id: "t1".to_string(),
            user_id: 7,
            title: "Buy milk".to_string(),
            completed: false,
            priority: Priority::High,
            due_date: NaiveDate::from_ymd_opt(2024, 5, 1),
            due_time: Some("18:00".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(TaskWithSubtasks {
            task,
            subtasks: vec![],
        })
        .unwrap();

        assert_eq!(json["title"], "Buy milk");
        assert_eq!(json["priority"], "High");
        assert_eq!(json["due_date"], "2024-05-01");
        assert_eq!(json["due_time"], "18:00");
        assert_eq!(json["subtasks"], serde_json::json!([]));
    }
}
