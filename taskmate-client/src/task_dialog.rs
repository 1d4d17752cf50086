/// "Add task" dialog state
///
/// The dialog collects a draft and hands a [`NewTask`] to the caller on
/// submit. It never talks to the server; persistence is the caller's job.
///
/// ```
/// use taskmate_client::task_dialog::TaskDialog;
/// use taskmate_shared::models::task::Priority;
///
/// let mut dialog = TaskDialog::new();
/// dialog.open();
/// dialog.set_title("Buy milk");
/// dialog.set_priority(Priority::High);
/// dialog.set_due_date_input("2024-05-01").unwrap();
/// dialog.set_due_time_input("18:00").unwrap();
///
/// let mut added = None;
/// assert!(dialog.submit(|task| added = Some(task)));
/// assert_eq!(added.unwrap().title, "Buy milk");
/// assert!(!dialog.is_open());
/// ```

use chrono::NaiveDate;
use serde::Serialize;
use taskmate_shared::models::task::{is_valid_due_time, Priority};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DialogError {
    #[error("Invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Invalid time {0:?}, expected HH:MM")]
    InvalidTime(String),
}

/// Form contents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<String>,
}

/// A task as assembled by the dialog, ready to be created
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTask {
    pub title: String,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<String>,
    pub completed: bool,
    pub subtasks: Vec<String>,
}

#[derive(Debug, Default)]
pub struct TaskDialog {
    is_open: bool,
    draft: TaskDraft,
}

impl TaskDialog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn draft(&self) -> &TaskDraft {
        &self.draft
    }

    pub fn open(&mut self) {
        self.is_open = true;
    }

    /// Closes without submitting; the draft is kept for the next open
    pub fn close(&mut self) {
        self.is_open = false;
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.draft.title = title.into();
    }

    pub fn set_priority(&mut self, priority: Priority) {
        self.draft.priority = priority;
    }

    /// Empty input clears the date; anything else must be `YYYY-MM-DD`
    pub fn set_due_date_input(&mut self, input: &str) -> Result<(), DialogError> {
        let input = input.trim();
        if input.is_empty() {
            self.draft.due_date = None;
            return Ok(());
        }

        let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
            .map_err(|_| DialogError::InvalidDate(input.to_string()))?;
        self.draft.due_date = Some(date);
        Ok(())
    }

    /// Empty input clears the time; anything else must be `HH:MM`
    pub fn set_due_time_input(&mut self, input: &str) -> Result<(), DialogError> {
        let input = input.trim();
        if input.is_empty() {
            self.draft.due_time = None;
            return Ok(());
        }

        if !is_valid_due_time(input) {
            return Err(DialogError::InvalidTime(input.to_string()));
        }
        self.draft.due_time = Some(input.to_string());
        Ok(())
    }

    /// Hands the draft to `on_add` and resets the dialog
    ///
    /// A blank title makes this a no-op: `on_add` isn't called, the dialog
    /// stays open and `false` is returned. The title is passed as typed.
    pub fn submit<F>(&mut self, on_add: F) -> bool
    where
        F: FnOnce(NewTask),
    {
        if self.draft.title.trim().is_empty() {
            return false;
        }

        let draft = std::mem::take(&mut self.draft);
        on_add(NewTask {
            title: draft.title,
            priority: draft.priority,
            due_date: draft.due_date,
            due_time: draft.due_time,
            completed: false,
            subtasks: Vec::new(),
        });

        self.is_open = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_title_is_a_no_op() {
        for title in ["", "   ", "\t\n"] {
            let mut dialog = TaskDialog::new();
            dialog.open();
            dialog.set_title(title);

            let mut called = false;
            assert!(!dialog.submit(|_| called = true));
            assert!(!called);
            assert!(dialog.is_open());
        }
    }

    #[test]
    fn test_submit_assembles_exact_task() {
        let mut dialog = TaskDialog::new();
        dialog.open();
        dialog.set_title("Buy milk");
        dialog.set_priority(Priority::High);
        dialog.set_due_date_input("2024-05-01").unwrap();
        dialog.set_due_time_input("18:00").unwrap();

        let mut added = Vec::new();
        assert!(dialog.submit(|task| added.push(task)));

        assert_eq!(
            added,
            vec![NewTask {
                title: "Buy milk".to_string(),
                priority: Priority::High,
                due_date: NaiveDate::from_ymd_opt(2024, 5, 1),
                due_time: Some("18:00".to_string()),
                completed: false,
                subtasks: vec![],
            }]
        );
        assert!(!dialog.is_open());
        assert_eq!(dialog.draft(), &TaskDraft::default());
    }

    #[test]
    fn test_title_passed_untrimmed() {
        let mut dialog = TaskDialog::new();
        dialog.set_title("  Call mom ");

        let mut title = String::new();
        dialog.submit(|task| title = task.title);
        assert_eq!(title, "  Call mom ");
    }

    #[test]
    fn test_defaults() {
        let mut dialog = TaskDialog::new();
        dialog.set_title("x");

        let mut added = None;
        dialog.submit(|task| added = Some(task));
        let task = added.unwrap();
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.due_date, None);
        assert_eq!(task.due_time, None);
    }

    #[test]
    fn test_date_and_time_inputs() {
        let mut dialog = TaskDialog::new();

        dialog.set_due_date_input("2024-05-01").unwrap();
        assert_eq!(
            dialog.set_due_date_input("05/01/2024"),
            Err(DialogError::InvalidDate("05/01/2024".to_string()))
        );
        assert_eq!(dialog.draft().due_date, NaiveDate::from_ymd_opt(2024, 5, 1));
        dialog.set_due_date_input("").unwrap();
        assert_eq!(dialog.draft().due_date, None);

        assert!(dialog.set_due_time_input("25:00").is_err());
        dialog.set_due_time_input(" 07:30 ").unwrap();
        assert_eq!(dialog.draft().due_time.as_deref(), Some("07:30"));
        dialog.set_due_time_input("").unwrap();
        assert_eq!(dialog.draft().due_time, None);
    }

    #[test]
    fn test_serializes_as_create_request() {
        let task = NewTask {
            title: "Buy milk".to_string(),
            priority: Priority::High,
            due_date: NaiveDate::from_ymd_opt(2024, 5, 1),
            due_time: Some("18:00".to_string()),
            completed: false,
            subtasks: vec![],
        };

        assert_eq!(
            serde_json::to_value(&task).unwrap(),
            serde_json::json!({
                "title": "Buy milk",
                "priority": "High",
                "due_date": "2024-05-01",
                "due_time": "18:00",
                "completed": false,
                "subtasks": []
            })
        );
    }
}
