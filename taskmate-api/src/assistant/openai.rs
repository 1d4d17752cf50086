/// OpenAI-compatible chat completions client
///
/// Posts to `{LLM_API_URL}/chat/completions` with `stream: true` and reads
/// the server-sent events line by line. Text deltas are forwarded as they
/// arrive. Tool calls arrive fragmented across deltas keyed by `index`; the
/// fragments are stitched together and emitted once the stream ends.

use super::model::{ChatModel, ModelError, ModelEvent, ModelMessage, ToolCallRequest, ToolDefinition};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::mpsc;

pub struct OpenAiChatModel {
    endpoint: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl fmt::Debug for OpenAiChatModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiChatModel")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiChatModel {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("taskmate-api/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| ModelError::NotConfigured(e.to_string()))?;

        Ok(Self {
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }

    /// Request body for one round
    pub fn request_body(&self, messages: &[ModelMessage], tools: &[ToolDefinition]) -> Value {
        let mut body = json!({
            "model": self.model,
            "stream": true,
            "messages": messages.iter().map(message_to_json).collect::<Vec<_>>(),
        });

        if !tools.is_empty() {
            body["tools"] = tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name.as_str(),
                            "description": tool.description,
                            "parameters": tool.parameters,
                        }
                    })
                })
                .collect::<Vec<_>>()
                .into();
        }

        body
    }
}

fn message_to_json(message: &ModelMessage) -> Value {
    match message {
        ModelMessage::System(content) => json!({"role": "system", "content": content}),
        ModelMessage::User(content) => json!({"role": "user", "content": content}),
        ModelMessage::Assistant { content, tool_calls } if tool_calls.is_empty() => {
            json!({"role": "assistant", "content": content})
        }
        ModelMessage::Assistant { content, tool_calls } => json!({
            "role": "assistant",
            "content": if content.is_empty() { Value::Null } else { json!(content) },
            "tool_calls": tool_calls.iter().map(|call| json!({
                "id": call.id,
                "type": "function",
                "function": {"name": call.name, "arguments": call.arguments},
            })).collect::<Vec<_>>(),
        }),
        ModelMessage::Tool { call_id, content } => {
            json!({"role": "tool", "tool_call_id": call_id, "content": content})
        }
    }
}

/// Classification of one SSE line
#[derive(Debug, Clone, PartialEq)]
pub enum StreamLine {
    Data(Value),
    Done,
    /// Blank lines, comments, other fields and unparseable payloads
    Skip,
}

pub fn parse_stream_line(line: &str) -> StreamLine {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(data) = line.strip_prefix("data:") else {
        return StreamLine::Skip;
    };

    let data = data.trim();
    if data == "[DONE]" {
        return StreamLine::Done;
    }
    if data.is_empty() {
        return StreamLine::Skip;
    }

    match serde_json::from_str::<Value>(data) {
        Ok(value) => StreamLine::Data(value),
        Err(e) => {
            tracing::warn!(error = %e, "Skipping malformed model stream payload");
            StreamLine::Skip
        }
    }
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Stitches fragmented `delta.tool_calls` entries back together
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<u64, PartialToolCall>,
}

impl ToolCallAccumulator {
    pub fn apply(&mut self, tool_call_deltas: &[Value]) {
        for (position, delta) in tool_call_deltas.iter().enumerate() {
            let index = delta
                .get("index")
                .and_then(Value::as_u64)
                .unwrap_or(position as u64);
            let entry = self.calls.entry(index).or_default();

            if let Some(id) = delta.get("id").and_then(Value::as_str) {
                entry.id.push_str(id);
            }
            if let Some(function) = delta.get("function") {
                if let Some(name) = function.get("name").and_then(Value::as_str) {
                    entry.name.push_str(name);
                }
                if let Some(arguments) = function.get("arguments").and_then(Value::as_str) {
                    entry.arguments.push_str(arguments);
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Completed calls in index order; nameless fragments are dropped
    pub fn finish(self) -> Vec<ToolCallRequest> {
        self.calls
            .into_iter()
            .filter(|(_, call)| !call.name.is_empty())
            .map(|(index, call)| ToolCallRequest {
                id: if call.id.is_empty() {
                    format!("call_{}", index)
                } else {
                    call.id
                },
                name: call.name,
                arguments: if call.arguments.trim().is_empty() {
                    "{}".to_string()
                } else {
                    call.arguments
                },
            })
            .collect()
    }
}

/// Extracts `(content_delta, tool_call_deltas)` from one chunk payload
fn delta_parts(value: &Value) -> (Option<&str>, &[Value]) {
    let delta = value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("delta"));

    let content = delta.and_then(|d| d.get("content")).and_then(Value::as_str);
    let tool_calls = delta
        .and_then(|d| d.get("tool_calls"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    (content, tool_calls)
}

async fn emit(events: &mpsc::Sender<ModelEvent>, event: ModelEvent) -> Result<(), ModelError> {
    events.send(event).await.map_err(|_| ModelError::Cancelled)
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn stream(
        &self,
        messages: &[ModelMessage],
        tools: &[ToolDefinition],
        events: mpsc::Sender<ModelEvent>,
    ) -> Result<(), ModelError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(messages, tools))
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }

        let mut accumulator = ToolCallAccumulator::default();
        let mut line_buffer: Vec<u8> = Vec::new();
        let mut bytes_stream = response.bytes_stream();

        'read: while let Some(chunk) = bytes_stream.next().await {
            let chunk = chunk.map_err(|e| ModelError::Transport(e.to_string()))?;
            line_buffer.extend_from_slice(&chunk);

            while let Some(newline) = line_buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = line_buffer.drain(..=newline).collect();
                match parse_stream_line(&String::from_utf8_lossy(&line)) {
                    StreamLine::Done => break 'read,
                    StreamLine::Skip => {}
                    StreamLine::Data(value) => {
                        if let Some(error) = value.get("error") {
                            return Err(ModelError::Protocol(error.to_string()));
                        }
                        let (content, tool_calls) = delta_parts(&value);
                        accumulator.apply(tool_calls);
                        if let Some(text) = content.filter(|t| !t.is_empty()) {
                            emit(&events, ModelEvent::TextDelta(text.to_string())).await?;
                        }
                    }
                }
            }
        }

        for call in accumulator.finish() {
            emit(&events, ModelEvent::ToolCall(call)).await?;
        }
        emit(&events, ModelEvent::Finished).await
    }
}
