/// Chat wire types
///
/// These are the JSON shapes exchanged between the API and chat clients.
/// They use camelCase field names on the wire.
///
/// # Stream format
///
/// `POST /v1/chat/completions` answers with `text/event-stream`. Each event
/// is one line `data: <ChatChunk JSON>`, and the stream ends with
/// `data: [DONE]`. Every chunk carries the assistant's *accumulated* text,
/// so a client only ever has to replace its placeholder content.
///
/// A turn that fails on the server ends with a chunk whose `error` is set
/// (see [`ChatChunk::failed`]). Its content is not a reply and nothing was
/// persisted for it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use crate::models::chat_message::ChatRole;
use crate::models::chat_message::ChatMessage;

/// Terminal SSE payload
pub const DONE_SENTINEL: &str = "[DONE]";

/// Default page size for history requests
pub const DEFAULT_HISTORY_LIMIT: i64 = 20;

/// Largest page a client may ask for
pub const MAX_HISTORY_LIMIT: i64 = 100;

/// A message as returned by the history endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessage {
    pub id: i32,
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<ChatMessage> for HistoryMessage {
    fn from(message: ChatMessage) -> Self {
        Self {
            id: message.id,
            role: message.role,
            content: message.content,
            created_at: message.created_at,
        }
    }
}

/// One page of history, newest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub messages: Vec<HistoryMessage>,
    /// Pass back as `cursor` to fetch strictly older messages
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

impl HistoryPage {
    /// Builds a page from newest-first messages
    pub fn from_messages(messages: Vec<HistoryMessage>, has_more: bool) -> Self {
        let next_cursor = messages.last().map(|m| m.id.to_string());
        Self {
            messages,
            next_cursor,
            has_more,
        }
    }
}

/// Parses a history cursor (the id of the oldest message already held)
pub fn parse_cursor(cursor: &str) -> Option<i32> {
    cursor.trim().parse::<i32>().ok().filter(|id| *id > 0)
}

/// The tools the assistant can call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolName {
    #[serde(rename = "createTaskTool")]
    CreateTask,
    #[serde(rename = "getTasksTool")]
    GetTasks,
    #[serde(rename = "deleteTaskTool")]
    DeleteTask,
    #[serde(rename = "searchTaskByTitleTool")]
    SearchTaskByTitle,
    #[serde(rename = "updateTaskTool")]
    UpdateTask,
}

impl ToolName {
    pub const ALL: [ToolName; 5] = [
        ToolName::CreateTask,
        ToolName::GetTasks,
        ToolName::DeleteTask,
        ToolName::SearchTaskByTitle,
        ToolName::UpdateTask,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::CreateTask => "createTaskTool",
            ToolName::GetTasks => "getTasksTool",
            ToolName::DeleteTask => "deleteTaskTool",
            ToolName::SearchTaskByTitle => "searchTaskByTitleTool",
            ToolName::UpdateTask => "updateTaskTool",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown tool: {}", s))
    }
}

/// Structured tool-invocation notice carried in a chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallNotice {
    pub name: ToolName,
}

/// One streamed increment of an assistant response
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatChunk {
    /// Full accumulated assistant text so far
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub is_streaming: bool,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallNotice>,
    /// Server id of the persisted user turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message_id: Option<i32>,
    /// Server id of the persisted assistant reply (final chunk only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_message_id: Option<i32>,
    /// Set on the final chunk of a failed turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatChunk {
    /// An in-progress chunk with the accumulated text
    pub fn streaming(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_streaming: true,
            ..Default::default()
        }
    }

    /// Announces a tool invocation
    pub fn tool(content: impl Into<String>, name: ToolName) -> Self {
        Self {
            tool_call: Some(ToolCallNotice { name }),
            ..Self::streaming(content)
        }
    }

    /// The final chunk of a response
    pub fn complete(content: impl Into<String>, assistant_message_id: Option<i32>) -> Self {
        Self {
            content: content.into(),
            is_streaming: false,
            is_complete: true,
            assistant_message_id,
            ..Default::default()
        }
    }

    /// Ends a turn that failed; the message is meant for the user
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            is_complete: true,
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    pub fn with_user_message_id(mut self, id: i32) -> Self {
        self.user_message_id = Some(id);
        self
    }
}

/// A prior turn sent by the client as context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Body of `POST /v1/chat/completions`
///
/// The last message must be the new user turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub messages: Vec<CompletionMessage>,
    /// IANA time zone of the user, e.g. `Europe/Berlin`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl CompletionRequest {
    /// The newest user turn, if the request ends with one
    pub fn latest_user_message(&self) -> Option<&str> {
        self.messages
            .last()
            .filter(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
            .filter(|c| !c.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_name_round_trip_names() {
        for tool in ToolName::ALL {
            assert_eq!(tool.as_str().parse::<ToolName>().unwrap(), tool);
            assert_eq!(
                serde_json::to_value(tool).unwrap(),
                json!(tool.as_str())
            );
        }
        assert!("dropTableTool".parse::<ToolName>().is_err());
    }

    #[test]
    fn test_chunk_wire_format() {
        let chunk = ChatChunk::tool("Let me check", ToolName::GetTasks).with_user_message_id(7);
        let value = serde_json::to_value(&chunk).unwrap();

        assert_eq!(
            value,
            json!({
                "content": "Let me check",
                "isStreaming": true,
                "isComplete": false,
                "toolCall": {"name": "getTasksTool"},
                "userMessageId": 7
            })
        );
    }

    #[test]
    fn test_chunk_parses_minimal_payload() {
        let chunk: ChatChunk = serde_json::from_str(r#"{"content":"Hi"}"#).unwrap();
        assert_eq!(chunk.content, "Hi");
        assert!(!chunk.is_streaming);
        assert!(chunk.tool_call.is_none());
    }

    #[test]
    fn test_complete_chunk() {
        let chunk = ChatChunk::complete("Done", Some(12));
        assert!(chunk.is_complete);
        assert!(!chunk.is_streaming);
        assert_eq!(chunk.assistant_message_id, Some(12));
    }

    #[test]
    fn test_failed_chunk() {
        let chunk = ChatChunk::failed("Sorry, try again");
        assert!(chunk.is_failure());
        assert!(chunk.is_complete);
        assert_eq!(chunk.content, "");
        assert_eq!(
            serde_json::to_value(&chunk).unwrap(),
            json!({
                "content": "",
                "isStreaming": false,
                "isComplete": true,
                "error": "Sorry, try again"
            })
        );

        let ok: ChatChunk = serde_json::from_str(r#"{"content":"Hi","isComplete":true}"#).unwrap();
        assert!(!ok.is_failure());
    }

    #[test]
    fn test_history_page_cursor_is_oldest_id() {
        let now = Utc::now();
        let page = HistoryPage::from_messages(
            vec![
                HistoryMessage { id: 9, role: ChatRole::Assistant, content: "b".into(), created_at: now },
                HistoryMessage { id: 8, role: ChatRole::User, content: "a".into(), created_at: now },
            ],
            true,
        );
        assert_eq!(page.next_cursor.as_deref(), Some("8"));

        let value = serde_json::to_value(&page).unwrap();
        assert_eq!(value["nextCursor"], "8");
        assert_eq!(value["hasMore"], true);
        assert!(value["messages"][0]["createdAt"].is_string());
    }

    #[test]
    fn test_empty_page_has_no_cursor() {
        let page = HistoryPage::from_messages(vec![], false);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_parse_cursor() {
        assert_eq!(parse_cursor("42"), Some(42));
        assert_eq!(parse_cursor(" 7 "), Some(7));
        assert_eq!(parse_cursor("0"), None);
        assert_eq!(parse_cursor("abc"), None);
    }

    #[test]
    fn test_completion_request() {
        let request: CompletionRequest = serde_json::from_value(json!({
            "messages": [
                {"role": "assistant", "content": "Hi!"},
                {"role": "user", "content": "Add buy milk"}
            ],
            "timeZone": "Europe/Berlin"
        }))
        .unwrap();

        assert_eq!(request.latest_user_message(), Some("Add buy milk"));
        assert_eq!(request.time_zone.as_deref(), Some("Europe/Berlin"));

        let trailing_assistant = CompletionRequest {
            messages: vec![CompletionMessage {
                role: ChatRole::Assistant,
                content: "x".into(),
            }],
            time_zone: None,
        };
        assert_eq!(trailing_assistant.latest_user_message(), None);
    }
}
