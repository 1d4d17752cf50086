/// Task tools exposed to the assistant
///
/// Five tools let the model act on the signed-in user's task list. Each
/// takes a JSON arguments object and returns a JSON result. Failures are
/// reported back to the model as `{"error": "..."}` instead of failing the
/// turn.

use super::model::ToolDefinition;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use taskmate_shared::chat::ToolName;
use taskmate_shared::models::task::{
    is_valid_due_time, CreateTask, Priority, Task, TaskFilter, UpdateTask,
};
use taskmate_shared::models::double_option;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ToolError {
    /// Result payload handed back to the model
    pub fn to_result(&self) -> Value {
        match self {
            // Internal details stay in the logs
            ToolError::Database(_) => json!({"error": "The task store is unavailable right now"}),
            other => json!({"error": other.to_string()}),
        }
    }
}

#[async_trait]
pub trait TaskTools: Send + Sync {
    async fn call(&self, tool: ToolName, arguments: Value) -> Result<Value, ToolError>;
}

/// JSON Schema definitions advertised to the model
pub fn definitions() -> Vec<ToolDefinition> {
    let priority = json!({"type": "string", "enum": ["Low", "Medium", "High", "Urgent"]});
    let due_date = json!({"type": "string", "description": "Due date as YYYY-MM-DD"});
    let due_time = json!({"type": "string", "description": "Due time as HH:MM (24-hour)"});

    vec![
        ToolDefinition {
            name: ToolName::CreateTask,
            description: "Create a new task for the user.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "priority": priority,
                    "dueDate": due_date,
                    "dueTime": due_time,
                },
                "required": ["title"],
            }),
        },
        ToolDefinition {
            name: ToolName::GetTasks,
            description: "List the user's tasks, optionally only completed or only open ones.",
            parameters: json!({
                "type": "object",
                "properties": {"completed": {"type": "boolean"}},
            }),
        },
        ToolDefinition {
            name: ToolName::DeleteTask,
            description: "Delete a task by id. Look the id up first if you only know the title.",
            parameters: json!({
                "type": "object",
                "properties": {"taskId": {"type": "string"}},
                "required": ["taskId"],
            }),
        },
        ToolDefinition {
            name: ToolName::SearchTaskByTitle,
            description: "Find tasks whose title contains the given text (case-insensitive).",
            parameters: json!({
                "type": "object",
                "properties": {"title": {"type": "string"}},
                "required": ["title"],
            }),
        },
        ToolDefinition {
            name: ToolName::UpdateTask,
            description: "Update fields of a task by id. Pass null for dueDate or dueTime to clear them.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "taskId": {"type": "string"},
                    "title": {"type": "string"},
                    "completed": {"type": "boolean"},
                    "priority": priority,
                    "dueDate": {"type": ["string", "null"]},
                    "dueTime": {"type": ["string", "null"]},
                },
                "required": ["taskId"],
            }),
        },
    ]
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskArgs {
    title: String,
    priority: Option<String>,
    #[serde(alias = "due_date")]
    due_date: Option<String>,
    #[serde(alias = "due_time")]
    due_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GetTasksArgs {
    completed: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskIdArgs {
    #[serde(alias = "task_id", alias = "id")]
    task_id: String,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    #[serde(alias = "query")]
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateTaskArgs {
    #[serde(alias = "task_id", alias = "id")]
    task_id: String,
    title: Option<String>,
    completed: Option<bool>,
    priority: Option<String>,
    #[serde(default, alias = "due_date", deserialize_with = "double_option")]
    due_date: Option<Option<String>>,
    #[serde(default, alias = "due_time", deserialize_with = "double_option")]
    due_time: Option<Option<String>>,
}

fn parse_args<T: for<'de> Deserialize<'de>>(arguments: Value) -> Result<T, ToolError> {
    // Some models send `null` for tools without parameters
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

fn parse_priority(value: Option<&str>) -> Result<Option<Priority>, ToolError> {
    value
        .map(|p| p.parse::<Priority>().map_err(ToolError::InvalidArguments))
        .transpose()
}

fn parse_due_date(value: &str) -> Result<NaiveDate, ToolError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ToolError::InvalidArguments(format!("dueDate must be YYYY-MM-DD, got {}", value)))
}

fn parse_due_time(value: &str) -> Result<String, ToolError> {
    let value = value.trim();
    if is_valid_due_time(value) {
        Ok(value.to_string())
    } else {
        Err(ToolError::InvalidArguments(format!("dueTime must be HH:MM, got {}", value)))
    }
}

fn non_empty_title(title: &str) -> Result<&str, ToolError> {
    if title.trim().is_empty() {
        Err(ToolError::InvalidArguments("title must not be empty".to_string()))
    } else {
        Ok(title)
    }
}

/// Validated form of `createTaskTool` arguments
pub fn create_task_input(arguments: Value) -> Result<CreateTask, ToolError> {
    let args: CreateTaskArgs = parse_args(arguments)?;

    Ok(CreateTask {
        title: non_empty_title(&args.title)?.to_string(),
        priority: parse_priority(args.priority.as_deref())?.unwrap_or_default(),
        due_date: args.due_date.as_deref().map(parse_due_date).transpose()?,
        due_time: args.due_time.as_deref().map(parse_due_time).transpose()?,
    })
}

/// Validated form of `updateTaskTool` arguments: `(task_id, update)`
pub fn update_task_input(arguments: Value) -> Result<(String, UpdateTask), ToolError> {
    let args: UpdateTaskArgs = parse_args(arguments)?;

    let update = UpdateTask {
        title: args
            .title
            .as_deref()
            .map(|t| non_empty_title(t).map(str::to_string))
            .transpose()?,
        completed: args.completed,
        priority: parse_priority(args.priority.as_deref())?,
        due_date: args
            .due_date
            .map(|d| d.as_deref().map(parse_due_date).transpose())
            .transpose()?,
        due_time: args
            .due_time
            .map(|t| t.as_deref().map(parse_due_time).transpose())
            .transpose()?,
    };

    if update.is_empty() {
        return Err(ToolError::InvalidArguments("no fields to update".to_string()));
    }

    Ok((args.task_id, update))
}

/// Executes tools against Postgres for one user
pub struct PgTaskTools {
    pool: PgPool,
    user_id: i32,
}

impl PgTaskTools {
    pub fn new(pool: PgPool, user_id: i32) -> Self {
        Self { pool, user_id }
    }
}

#[async_trait]
impl TaskTools for PgTaskTools {
    async fn call(&self, tool: ToolName, arguments: Value) -> Result<Value, ToolError> {
        tracing::debug!(user_id = self.user_id, tool = %tool, "Executing assistant tool");

        match tool {
            ToolName::CreateTask => {
                let input = create_task_input(arguments)?;
                let task = Task::create(&self.pool, self.user_id, input).await?;
                tracing::info!(user_id = self.user_id, task_id = %task.id, "Task created by assistant");
                Ok(json!({"task": task}))
            }
            ToolName::GetTasks => {
                let args: GetTasksArgs = parse_args(arguments)?;
                let tasks = Task::list_for_user(
                    &self.pool,
                    self.user_id,
                    &TaskFilter {
                        completed: args.completed,
                        search: None,
                    },
                )
                .await?;
                Ok(json!({"tasks": tasks}))
            }
            ToolName::DeleteTask => {
                let args: TaskIdArgs = parse_args(arguments)?;
                if Task::delete(&self.pool, &args.task_id, self.user_id).await? {
                    tracing::info!(user_id = self.user_id, task_id = %args.task_id, "Task deleted by assistant");
                    Ok(json!({"deleted": true, "taskId": args.task_id}))
                } else {
                    Err(ToolError::NotFound(format!("No task with id {}", args.task_id)))
                }
            }
            ToolName::SearchTaskByTitle => {
                let args: SearchArgs = parse_args(arguments)?;
                let tasks = Task::search_by_title(&self.pool, self.user_id, &args.title).await?;
                Ok(json!({"tasks": tasks}))
            }
            ToolName::UpdateTask => {
                let (task_id, update) = update_task_input(arguments)?;
                Task::update(&self.pool, &task_id, self.user_id, update)
                    .await?
                    .map(|task| json!({"task": task}))
                    .ok_or_else(|| ToolError::NotFound(format!("No task with id {}", task_id)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definitions_cover_every_tool() {
        let names: Vec<ToolName> = definitions().iter().map(|d| d.name).collect();
        assert_eq!(names, ToolName::ALL.to_vec());
        for definition in definitions() {
            assert_eq!(definition.parameters["type"], "object");
        }
    }

    #[test]
    fn test_create_task_input() {
        let input = create_task_input(json!({
            "title": "Buy milk",
            "priority": "high",
            "dueDate": "2024-05-01",
            "dueTime": "18:00"
        }))
        .unwrap();

        assert_eq!(input.title, "Buy milk");
        assert_eq!(input.priority, Priority::High);
        assert_eq!(input.due_date, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(input.due_time.as_deref(), Some("18:00"));
    }

    #[test]
    fn test_create_task_input_defaults_and_aliases() {
        let input = create_task_input(json!({"title": "Call mom", "due_date": "2024-12-24"})).unwrap();
        assert_eq!(input.priority, Priority::Medium);
        assert_eq!(input.due_date, NaiveDate::from_ymd_opt(2024, 12, 24));
        assert_eq!(input.due_time, None);
    }

    #[test]
    fn test_create_task_input_rejects_bad_values() {
        assert!(matches!(
            create_task_input(json!({"title": "   "})),
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(create_task_input(json!({"title": "x", "priority": "critical"})).is_err());
        assert!(create_task_input(json!({"title": "x", "dueDate": "05/01/2024"})).is_err());
        assert!(create_task_input(json!({"title": "x", "dueTime": "6pm"})).is_err());
        assert!(create_task_input(json!({})).is_err());
    }

    #[test]
    fn test_update_task_input_distinguishes_clear_from_absent() {
        let (id, update) = update_task_input(json!({
            "taskId": "t-1",
            "completed": true,
            "dueTime": null
        }))
        .unwrap();

        assert_eq!(id, "t-1");
        assert_eq!(update.completed, Some(true));
        assert_eq!(update.due_time, Some(None));
        assert_eq!(update.due_date, None);
        assert_eq!(update.title, None);
    }

    #[test]
    fn test_update_task_input_requires_a_change() {
        assert!(update_task_input(json!({"taskId": "t-1"})).is_err());
        assert!(update_task_input(json!({"completed": true})).is_err());
    }

    #[test]
    fn test_null_arguments_are_empty_object() {
        let args: GetTasksArgs = parse_args(Value::Null).unwrap();
        assert_eq!(args.completed, None);
    }

    #[test]
    fn test_database_errors_are_not_leaked() {
        let err = ToolError::Database(sqlx::Error::PoolTimedOut);
        assert_eq!(err.to_result(), json!({"error": "The task store is unavailable right now"}));

        let err = ToolError::NotFound("No task with id x".into());
        assert_eq!(err.to_result(), json!({"error": "No task with id x"}));
    }
}
