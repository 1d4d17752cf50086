/// Drives one assistant turn
///
/// The runner alternates model rounds and tool executions until the model
/// answers without calling a tool or `max_steps` rounds have run. The last
/// allowed round is offered no tools, so it has to answer in text.
///
/// Chunks go to the client channel as they happen:
///
/// - every text delta: `ChatChunk::streaming(full_text_so_far)`
/// - every tool call: `ChatChunk::tool(full_text_so_far, name)`
///
/// If the client channel closes, the runner stops with
/// [`RunError::ClientGone`].

use super::model::{
    ChatModel, ModelError, ModelEvent, ModelMessage, ToolCallRequest, ToolDefinition,
};
use super::tools::{definitions, TaskTools, ToolError};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use taskmate_shared::chat::{ChatChunk, ChatRole, CompletionMessage, ToolName};
use thiserror::Error;
use tokio::sync::mpsc;

pub const DEFAULT_MAX_STEPS: usize = 5;

/// Most prior turns forwarded to the model
pub const MAX_CONTEXT_MESSAGES: usize = 20;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Client disconnected")]
    ClientGone,
}

/// Completed turn
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub text: String,
    pub tools_called: Vec<ToolName>,
}

/// System prompt with the current time and the user's time zone
pub fn system_prompt(now: DateTime<Utc>, time_zone: &str) -> String {
    format!(
        "You are Taskmate, a friendly assistant that manages the user's task list.\n\
         Use the tools to create, list, search, update and delete tasks. \
         Never invent task ids: search or list first when you only know a title.\n\
         Priorities are Low, Medium, High or Urgent. Dates are YYYY-MM-DD and times HH:MM.\n\
         The current UTC time is {}. The user's time zone is {}; \
         interpret relative dates like \"tomorrow\" in that zone.\n\
         Keep answers short.",
        now.format("%Y-%m-%d %H:%M UTC"),
        time_zone
    )
}

/// Builds the model conversation from the client's recent turns
pub fn build_conversation(
    system: String,
    history: &[CompletionMessage],
) -> Vec<ModelMessage> {
    let start = history.len().saturating_sub(MAX_CONTEXT_MESSAGES);

    std::iter::once(ModelMessage::System(system))
        .chain(history[start..].iter().map(|m| match m.role {
            ChatRole::User => ModelMessage::User(m.content.clone()),
            ChatRole::Assistant => ModelMessage::assistant_text(m.content.clone()),
        }))
        .collect()
}

pub struct AssistantRunner {
    model: Arc<dyn ChatModel>,
    tools: Arc<dyn TaskTools>,
    max_steps: usize,
}

impl AssistantRunner {
    pub fn new(model: Arc<dyn ChatModel>, tools: Arc<dyn TaskTools>, max_steps: usize) -> Self {
        Self {
            model,
            tools,
            max_steps: max_steps.max(1),
        }
    }

    pub async fn run(
        &self,
        mut conversation: Vec<ModelMessage>,
        out: &mpsc::Sender<ChatChunk>,
    ) -> Result<RunOutcome, RunError> {
        let all_tools = definitions();
        let mut text = String::new();
        let mut tools_called = Vec::new();

        for step in 0..self.max_steps {
            let offered: &[ToolDefinition] = if step + 1 == self.max_steps { &[] } else { &all_tools };

            let (events_tx, events_rx) = mpsc::channel::<ModelEvent>(64);
            let round_start = text.len();
            let mut calls: Vec<ToolCallRequest> = Vec::new();

            let model_round = self.model.stream(&conversation, offered, events_tx);
            let consume = async {
                // Dropping the receiver early cancels the model round
                let mut events_rx = events_rx;
                while let Some(event) = events_rx.recv().await {
                    match event {
                        ModelEvent::TextDelta(delta) => {
                            if text.len() == round_start && !text.is_empty() {
                                text.push_str("\n\n");
                            }
                            text.push_str(&delta);
                            out.send(ChatChunk::streaming(text.clone()))
                                .await
                                .map_err(|_| RunError::ClientGone)?;
                        }
                        ModelEvent::ToolCall(call) => {
                            if let Ok(name) = call.name.parse::<ToolName>() {
                                out.send(ChatChunk::tool(text.clone(), name))
                                    .await
                                    .map_err(|_| RunError::ClientGone)?;
                            }
                            calls.push(call);
                        }
                        ModelEvent::Finished => break,
                    }
                }
                Ok::<(), RunError>(())
            };

            let (model_result, consume_result) = tokio::join!(model_round, consume);
            consume_result?;
            match model_result {
                Ok(()) => {}
                Err(ModelError::Cancelled) => return Err(RunError::ClientGone),
                Err(e) => return Err(e.into()),
            }

            if calls.is_empty() {
                break;
            }

            let round_text = text[round_start..].trim_start().to_string();
            conversation.push(ModelMessage::Assistant {
                content: round_text,
                tool_calls: calls.clone(),
            });

            for call in calls {
                let result = self.execute(&call).await;
                if let Ok(name) = call.name.parse::<ToolName>() {
                    tools_called.push(name);
                }
                conversation.push(ModelMessage::Tool {
                    call_id: call.id,
                    content: result.to_string(),
                });
            }

            if out.is_closed() {
                return Err(RunError::ClientGone);
            }
        }

        Ok(RunOutcome { text, tools_called })
    }

    async fn execute(&self, call: &ToolCallRequest) -> Value {
        let tool = match call.name.parse::<ToolName>() {
            Ok(tool) => tool,
            Err(e) => {
                tracing::warn!(tool = %call.name, "Model called an unknown tool");
                return ToolError::InvalidArguments(e).to_result();
            }
        };

        let arguments = match serde_json::from_str::<Value>(&call.arguments) {
            Ok(arguments) => arguments,
            Err(e) => {
                return ToolError::InvalidArguments(format!("arguments are not JSON: {}", e))
                    .to_result()
            }
        };

        match self.tools.call(tool, arguments).await {
            Ok(result) => result,
            Err(e) => {
                match &e {
                    ToolError::Database(db) => {
                        tracing::error!(error = %db, tool = %tool, "Tool failed")
                    }
                    other => tracing::debug!(error = %other, tool = %tool, "Tool rejected call"),
                }
                e.to_result()
            }
        }
    }
}
