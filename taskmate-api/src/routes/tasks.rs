/// Task and subtask endpoints
///
/// All routes are scoped to the session user; another user's task is
/// reported as not found.
///
/// # Endpoints
///
/// - `GET    /v1/tasks?completed=&search=` - List tasks with subtasks, oldest first
/// - `POST   /v1/tasks` - Create a task
/// - `GET    /v1/tasks/:id`
/// - `PATCH  /v1/tasks/:id` - Partial update; `null` clears `due_date` / `due_time`
/// - `DELETE /v1/tasks/:id`
/// - `POST   /v1/tasks/:id/subtasks`
/// - `PATCH  /v1/subtasks/:id`
/// - `DELETE /v1/subtasks/:id`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use taskmate_shared::{
    auth::session::AuthContext,
    models::{
        double_option,
        subtask::{Subtask, UpdateSubtask},
        task::{is_valid_due_time, CreateTask, Priority, Task, TaskFilter, TaskWithSubtasks, UpdateTask},
    },
};
use validator::{Validate, ValidationError};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    #[validate(
        length(max = 500, message = "Title must be at most 500 characters"),
        custom(function = "not_blank")
    )]
    pub title: String,
    #[serde(default)]
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<String>,
    /// Titles of subtasks to create with the task
    #[serde(default)]
    #[validate(custom(function = "subtask_titles"))]
    pub subtasks: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateTaskRequest {
    #[validate(
        length(max = 500, message = "Title must be at most 500 characters"),
        custom(function = "not_blank")
    )]
    pub title: Option<String>,
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_time: Option<Option<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListTasksQuery {
    pub completed: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubtaskRequest {
    #[validate(
        length(max = 500, message = "Title must be at most 500 characters"),
        custom(function = "not_blank")
    )]
    pub title: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateSubtaskRequest {
    #[validate(
        length(max = 500, message = "Title must be at most 500 characters"),
        custom(function = "not_blank")
    )]
    pub title: Option<String>,
    pub completed: Option<bool>,
}

fn not_blank(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::new("blank").with_message("Title is required".into()));
    }
    Ok(())
}

fn subtask_titles(titles: &[String]) -> Result<(), ValidationError> {
    for title in titles {
        not_blank(title)?;
        if title.chars().count() > 500 {
            return Err(ValidationError::new("length")
                .with_message("Subtask titles must be at most 500 characters".into()));
        }
    }
    Ok(())
}

fn validate_due_time(due_time: Option<&str>) -> ApiResult<()> {
    match due_time {
        Some(time) if !is_valid_due_time(time) => {
            Err(ApiError::field("due_time", "Expected a 24-hour time as HH:MM"))
        }
        _ => Ok(()),
    }
}

impl CreateTaskRequest {
    pub fn into_create(self) -> ApiResult<(CreateTask, Vec<String>)> {
        self.validate()?;

        let due_time = self.due_time.filter(|t| !t.trim().is_empty());
        validate_due_time(due_time.as_deref())?;

        Ok((
            CreateTask {
                title: self.title,
                priority: self.priority,
                due_date: self.due_date,
                due_time,
            },
            self.subtasks,
        ))
    }
}

impl UpdateTaskRequest {
    pub fn into_update(self) -> ApiResult<UpdateTask> {
        self.validate()?;

        let due_time = self
            .due_time
            .map(|t| t.filter(|t| !t.trim().is_empty()));
        validate_due_time(due_time.as_ref().and_then(|t| t.as_deref()))?;

        let update = UpdateTask {
            title: self.title,
            completed: self.completed,
            priority: self.priority,
            due_date: self.due_date,
            due_time,
        };

        if update.is_empty() {
            return Err(ApiError::BadRequest("No fields to update".to_string()));
        }
        Ok(update)
    }
}

fn task_not_found(id: &str) -> ApiError {
    ApiError::NotFound(format!("Task {} not found", id))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListTasksQuery>,
) -> ApiResult<Json<Vec<TaskWithSubtasks>>> {
    let filter = TaskFilter {
        completed: query.completed,
        search: query.search.filter(|s| !s.trim().is_empty()),
    };

    let tasks = Task::list_for_user(&state.db, auth.user_id, &filter).await?;
    Ok(Json(Task::with_subtasks(&state.db, tasks).await?))
}

pub async fn create_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<TaskWithSubtasks>)> {
    let (data, subtask_titles) = req.into_create()?;

    let mut tx = state.db.begin().await?;
    let task = Task::create(&mut *tx, auth.user_id, data).await?;
    let mut subtasks = Vec::with_capacity(subtask_titles.len());
    for title in &subtask_titles {
        subtasks.push(Subtask::create(&mut *tx, &task.id, title).await?);
    }
    tx.commit().await?;

    tracing::info!(user_id = auth.user_id, task_id = %task.id, "Task created");
    Ok((StatusCode::CREATED, Json(TaskWithSubtasks { task, subtasks })))
}

pub async fn get_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<TaskWithSubtasks>> {
    let task = Task::find_for_user(&state.db, &id, auth.user_id)
        .await?
        .ok_or_else(|| task_not_found(&id))?;

    let subtasks = Subtask::list_for_task(&state.db, &task.id).await?;
    Ok(Json(TaskWithSubtasks { task, subtasks }))
}

pub async fn update_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTaskRequest>,
) -> ApiResult<Json<TaskWithSubtasks>> {
    let update = req.into_update()?;

    let task = Task::update(&state.db, &id, auth.user_id, update)
        .await?
        .ok_or_else(|| task_not_found(&id))?;

    tracing::debug!(user_id = auth.user_id, task_id = %task.id, "Task updated");

    let subtasks = Subtask::list_for_task(&state.db, &task.id).await?;
    Ok(Json(TaskWithSubtasks { task, subtasks }))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if !Task::delete(&state.db, &id, auth.user_id).await? {
        return Err(task_not_found(&id));
    }

    tracing::info!(user_id = auth.user_id, task_id = %id, "Task deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_subtask(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<String>,
    Json(req): Json<CreateSubtaskRequest>,
) -> ApiResult<(StatusCode, Json<Subtask>)> {
    req.validate()?;

    let task = Task::find_for_user(&state.db, &task_id, auth.user_id)
        .await?
        .ok_or_else(|| task_not_found(&task_id))?;

    let subtask = Subtask::create(&state.db, &task.id, &req.title).await?;
    Ok((StatusCode::CREATED, Json(subtask)))
}

pub async fn update_subtask(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(req): Json<UpdateSubtaskRequest>,
) -> ApiResult<Json<Subtask>> {
    req.validate()?;
    if req.title.is_none() && req.completed.is_none() {
        return Err(ApiError::BadRequest("No fields to update".to_string()));
    }

    let subtask = Subtask::update(
        &state.db,
        &id,
        auth.user_id,
        UpdateSubtask {
            title: req.title,
            completed: req.completed,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("Subtask {} not found", id)))?;

    Ok(Json(subtask))
}

pub async fn delete_subtask(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if !Subtask::delete(&state.db, &id, auth.user_id).await? {
        return Err(ApiError::NotFound(format!("Subtask {} not found", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_request_example() {
        let req: CreateTaskRequest = serde_json::from_value(json!({
            "title": "Buy milk",
            "priority": "High",
            "due_date": "2024-05-01",
            "due_time": "18:00"
        }))
        .unwrap();

        let (data, subtasks) = req.into_create().unwrap();
        assert_eq!(data.title, "Buy milk");
        assert_eq!(data.priority, Priority::High);
        assert_eq!(data.due_date, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(data.due_time.as_deref(), Some("18:00"));
        assert!(subtasks.is_empty());
    }

    #[test]
    fn test_create_request_defaults_to_medium() {
        let req: CreateTaskRequest = serde_json::from_value(json!({"title": "x"})).unwrap();
        let (data, _) = req.into_create().unwrap();
        assert_eq!(data.priority, Priority::Medium);
        assert_eq!(data.due_date, None);
    }

    #[test]
    fn test_blank_title_rejected() {
        let req: CreateTaskRequest = serde_json::from_value(json!({"title": "   "})).unwrap();
        match req.into_create() {
            Err(ApiError::ValidationError(details)) => assert_eq!(details[0].field, "title"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_title_length_limits() {
        let at_limit: CreateTaskRequest =
            serde_json::from_value(json!({"title": "a".repeat(500)})).unwrap();
        assert!(at_limit.into_create().is_ok());

        let too_long: CreateTaskRequest =
            serde_json::from_value(json!({"title": "a".repeat(501)})).unwrap();
        match too_long.into_create() {
            Err(ApiError::ValidationError(details)) => {
                assert_eq!(details[0].field, "title");
                assert_eq!(details[0].message, "Title must be at most 500 characters");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_subtask_title_rejected() {
        let req: CreateTaskRequest =
            serde_json::from_value(json!({"title": "Trip", "subtasks": ["Pack", " "]})).unwrap();
        match req.into_create() {
            Err(ApiError::ValidationError(details)) => assert_eq!(details[0].field, "subtasks"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_subtask_requests_validate_titles() {
        let blank = CreateSubtaskRequest { title: "  ".to_string() };
        assert!(blank.validate().is_err());

        let rename = UpdateSubtaskRequest {
            title: Some("a".repeat(501)),
            completed: None,
        };
        assert!(rename.validate().is_err());

        let toggle = UpdateSubtaskRequest {
            title: None,
            completed: Some(true),
        };
        assert!(toggle.validate().is_ok());
    }

    #[test]
    fn test_update_request_rejects_blank_title() {
        let req: UpdateTaskRequest = serde_json::from_value(json!({"title": ""})).unwrap();
        assert!(matches!(req.into_update(), Err(ApiError::ValidationError(_))));
    }

    #[test]
    fn test_invalid_due_time_rejected() {
        let req: CreateTaskRequest =
            serde_json::from_value(json!({"title": "x", "due_time": "6pm"})).unwrap();
        assert!(matches!(req.into_create(), Err(ApiError::ValidationError(_))));
    }

    #[test]
    fn test_unknown_priority_fails_to_parse() {
        let result =
            serde_json::from_value::<CreateTaskRequest>(json!({"title": "x", "priority": "Asap"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_update_request_clears_due_date() {
        let req: UpdateTaskRequest =
            serde_json::from_value(json!({"due_date": null, "due_time": ""})).unwrap();
        let update = req.into_update().unwrap();
        assert_eq!(update.due_date, Some(None));
        assert_eq!(update.due_time, Some(None));
        assert_eq!(update.title, None);
    }

    #[test]
    fn test_empty_update_rejected() {
        let req: UpdateTaskRequest = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(req.into_update(), Err(ApiError::BadRequest(_))));
    }
}
