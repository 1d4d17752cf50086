/// Messages as held by the chat widget

use chrono::{DateTime, Utc};
use taskmate_shared::chat::{ChatRole, HistoryMessage};

use crate::tool_status::strip_tool_markers;

/// Identity of a message in the widget
///
/// Messages created locally (the optimistic user turn, the assistant
/// placeholder) start as `Local` and are re-keyed once the server reports
/// their persisted id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    Local(u64),
    Server(i32),
}

impl MessageKey {
    pub fn server_id(&self) -> Option<i32> {
        match self {
            MessageKey::Server(id) => Some(*id),
            MessageKey::Local(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatEntry {
    pub key: MessageKey,
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Assistant reply still receiving text
    pub streaming: bool,
    /// User turn not yet acknowledged by the server
    pub tentative: bool,
}

impl ChatEntry {
    pub fn local(id: u64, role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            key: MessageKey::Local(id),
            role,
            content: content.into(),
            created_at: Utc::now(),
            streaming: false,
            tentative: false,
        }
    }

    /// Content with tool markers removed
    pub fn display_content(&self) -> String {
        strip_tool_markers(&self.content)
    }

    pub fn is_user(&self) -> bool {
        self.role == ChatRole::User
    }
}

impl From<HistoryMessage> for ChatEntry {
    fn from(message: HistoryMessage) -> Self {
        Self {
            key: MessageKey::Server(message.id),
            role: message.role,
            content: message.content,
            created_at: message.created_at,
            streaming: false,
            tentative: false,
        }
    }
}
