/// Language model abstraction
///
/// A [`ChatModel`] takes a conversation plus tool definitions and streams
/// [`ModelEvent`]s into a channel: text deltas as they arrive, complete tool
/// calls once their arguments are fully received, then `Finished`.

use async_trait::async_trait;
use serde_json::Value;
use taskmate_shared::chat::ToolName;
use thiserror::Error;
use tokio::sync::mpsc;

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    /// Provider-assigned id, echoed back with the result
    pub id: String,
    pub name: String,
    /// Raw JSON argument text
    pub arguments: String,
}

/// One entry of the conversation sent to the model
#[derive(Debug, Clone, PartialEq)]
pub enum ModelMessage {
    System(String),
    User(String),
    Assistant {
        content: String,
        tool_calls: Vec<ToolCallRequest>,
    },
    Tool {
        call_id: String,
        content: String,
    },
}

impl ModelMessage {
    pub fn assistant_text(content: impl Into<String>) -> Self {
        ModelMessage::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// A function the model may call
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: ToolName,
    pub description: &'static str,
    /// JSON Schema of the arguments object
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    TextDelta(String),
    ToolCall(ToolCallRequest),
    Finished,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model is not configured: {0}")]
    NotConfigured(String),

    #[error("Model request failed: {0}")]
    Transport(String),

    #[error("Model API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed model stream: {0}")]
    Protocol(String),

    /// The event receiver went away
    #[error("Model stream consumer dropped")]
    Cancelled,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Streams one model round into `events`
    ///
    /// Returns `ModelError::Cancelled` if the receiver is dropped mid-stream.
    async fn stream(
        &self,
        messages: &[ModelMessage],
        tools: &[ToolDefinition],
        events: mpsc::Sender<ModelEvent>,
    ) -> Result<(), ModelError>;
}
