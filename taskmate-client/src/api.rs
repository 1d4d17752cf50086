/// HTTP access to the Taskmate API
///
/// [`ChatApi`] and [`TaskApi`] are the seams the session driver and the CLI
/// talk through; [`HttpApi`] implements both with reqwest. Completion
/// replies arrive as server-sent events and are decoded line by line into
/// [`ChatChunk`]s.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use std::fmt;
use taskmate_shared::chat::{ChatChunk, CompletionRequest, HistoryPage, DONE_SENTINEL};
use taskmate_shared::models::task::TaskWithSubtasks;
use thiserror::Error;
use tracing::{debug, warn};

use crate::task_dialog::NewTask;

/// Header carrying the user's time zone
pub const TIMEZONE_HEADER: &str = "x-timezone";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),
}

/// Decoded reply chunks, ending after the `[DONE]` sentinel
pub type ChunkStream = BoxStream<'static, Result<ChatChunk, ClientError>>;

#[async_trait]
pub trait ChatApi: Send + Sync {
    /// One page of history, newest first; `cursor` selects strictly older messages
    async fn history(&self, cursor: Option<&str>, limit: i64) -> Result<HistoryPage, ClientError>;

    /// Starts a completion and returns its chunk stream
    async fn complete(&self, request: &CompletionRequest) -> Result<ChunkStream, ClientError>;
}

#[async_trait]
pub trait TaskApi: Send + Sync {
    async fn create_task(&self, task: &NewTask) -> Result<TaskWithSubtasks, ClientError>;

    async fn list_tasks(&self) -> Result<Vec<TaskWithSubtasks>, ClientError>;
}

/// reqwest-backed API client authenticated with a session token
#[derive(Clone)]
pub struct HttpApi {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl fmt::Debug for HttpApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpApi")
            .field("base_url", &self.base_url)
            .field("token", &"[redacted]")
            .finish()
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl HttpApi {
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, ClientError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::InvalidUrl(base_url));
        }

        Ok(Self {
            base_url,
            token: token.into(),
            client: reqwest::Client::builder()
                .user_agent(concat!("taskmate-client/", env!("CARGO_PKG_VERSION")))
                .build()?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header(AUTHORIZATION, format!("Bearer {}", self.token))
    }

    /// Turns non-2xx responses into [`ClientError::Status`]
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.message)
            .unwrap_or_else(|_| status.canonical_reason().unwrap_or("error").to_string());

        Err(ClientError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ChatApi for HttpApi {
    async fn history(&self, cursor: Option<&str>, limit: i64) -> Result<HistoryPage, ClientError> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        let response = self
            .authorized(self.client.get(self.url("/v1/chat/history")))
            .query(&query)
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<ChunkStream, ClientError> {
        let mut builder = self
            .authorized(self.client.post(self.url("/v1/chat/completions")))
            .header(ACCEPT, "text/event-stream")
            .json(request);
        if let Some(zone) = &request.time_zone {
            builder = builder.header(TIMEZONE_HEADER, zone);
        }

        let response = Self::check(builder.send().await?).await?;
        debug!(messages = request.messages.len(), "Completion stream opened");

        Ok(sse_chunks(response.bytes_stream()))
    }
}

#[async_trait]
impl TaskApi for HttpApi {
    async fn create_task(&self, task: &NewTask) -> Result<TaskWithSubtasks, ClientError> {
        let response = self
            .authorized(self.client.post(self.url("/v1/tasks")))
            .json(task)
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }

    async fn list_tasks(&self) -> Result<Vec<TaskWithSubtasks>, ClientError> {
        let response = self
            .authorized(self.client.get(self.url("/v1/tasks")))
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }
}

/// One decoded event-stream line
#[derive(Debug, Clone, PartialEq)]
pub enum SseLine {
    Chunk(ChatChunk),
    Done,
    /// Blank lines, comments and fields other than `data`
    Skip,
    Malformed(String),
}

pub fn parse_sse_line(line: &str) -> SseLine {
    let Some(payload) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };

    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return SseLine::Done;
    }

    match serde_json::from_str::<ChatChunk>(payload) {
        Ok(chunk) => SseLine::Chunk(chunk),
        Err(_) => SseLine::Malformed(payload.to_string()),
    }
}

struct SseReader {
    bytes: BoxStream<'static, Result<Bytes, ClientError>>,
    buffer: BytesMut,
    exhausted: bool,
    done: bool,
}

impl SseReader {
    async fn next_chunk(&mut self) -> Option<Result<ChatChunk, ClientError>> {
        loop {
            if self.done {
                return None;
            }

            if let Some(end) = self.buffer.iter().position(|b| *b == b'\n') {
                let raw = self.buffer.split_to(end + 1);
                let line = String::from_utf8_lossy(&raw);
                match parse_sse_line(line.trim_end_matches(|c: char| c == '\r' || c == '\n')) {
                    SseLine::Chunk(chunk) => return Some(Ok(chunk)),
                    SseLine::Done => {
                        self.done = true;
                        return None;
                    }
                    SseLine::Skip => {}
                    SseLine::Malformed(payload) => {
                        warn!(payload = %payload, "Skipping malformed stream chunk");
                    }
                }
                continue;
            }

            if self.exhausted {
                self.done = true;
                return None;
            }

            match self.bytes.next().await {
                Some(Ok(bytes)) => self.buffer.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.exhausted = true;
                    // Flush a final line without a trailing newline
                    if !self.buffer.is_empty() {
                        self.buffer.extend_from_slice(b"\n");
                    }
                }
            }
        }
    }
}

/// Decodes an event stream body into chat chunks
///
/// The stream ends at `[DONE]` or when the body ends. Malformed `data`
/// lines are logged and skipped; transport errors end the stream.
pub fn sse_chunks<S, E>(body: S) -> ChunkStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<ClientError>,
{
    let reader = SseReader {
        bytes: body.map(|r| r.map_err(Into::into)).boxed(),
        buffer: BytesMut::new(),
        exhausted: false,
        done: false,
    };

    stream::unfold(reader, |mut reader| async move {
        let item = reader.next_chunk().await?;
        Some((item, reader))
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmate_shared::chat::ToolName;

    fn body(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, ClientError>> + Send {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(parse_sse_line(""), SseLine::Skip);
        assert_eq!(parse_sse_line(":"), SseLine::Skip);
        assert_eq!(parse_sse_line("event: message"), SseLine::Skip);
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(
            parse_sse_line(r#"data: {"content":"Hi","isStreaming":true}"#),
            SseLine::Chunk(ChatChunk::streaming("Hi"))
        );
        assert_eq!(
            parse_sse_line("data: {not json"),
            SseLine::Malformed("{not json".to_string())
        );
    }

    #[tokio::test]
    async fn test_chunks_split_across_reads() {
        let chunks: Vec<_> = sse_chunks(body(&[
            "data: {\"content\":\"Hel",
            "lo\",\"isStreaming\":true,\"userMessageId\":4}\n\n",
            ":\n\ndata: {\"content\":\"Hello\",\"isStreaming\":true,\"toolCall\":{\"name\":\"getTasksTool\"}}\r\n\r\n",
            "data: {\"content\":\"Hello!\",\"isComplete\":true,\"assistantMessageId\":5}\n\ndata: [DONE]\n\n",
            "data: {\"content\":\"after done\"}\n\n",
        ]))
        .collect()
        .await;

        let chunks: Vec<ChatChunk> = chunks.into_iter().map(|c| c.unwrap()).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].user_message_id, Some(4));
        assert_eq!(chunks[1].tool_call.as_ref().map(|t| t.name), Some(ToolName::GetTasks));
        assert!(chunks[2].is_complete);
        assert_eq!(chunks[2].assistant_message_id, Some(5));
    }

    #[tokio::test]
    async fn test_malformed_lines_skipped() {
        let chunks: Vec<_> = sse_chunks(body(&[
            "data: {\"content\":\"a\"}\n\ndata: garbage\n\ndata: {\"content\":\"ab\"}",
        ]))
        .collect()
        .await;

        let contents: Vec<String> = chunks.into_iter().map(|c| c.unwrap().content).collect();
        assert_eq!(contents, vec!["a", "ab"]);
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let parts: Vec<Result<Bytes, ClientError>> = vec![
            Ok(Bytes::from_static(b"data: {\"content\":\"a\"}\n\n")),
            Err(ClientError::Status { status: 502, message: "Bad Gateway".to_string() }),
            Ok(Bytes::from_static(b"data: {\"content\":\"never\"}\n\n")),
        ];
        let items: Vec<_> = sse_chunks(stream::iter(parts)).collect().await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(ClientError::Status { status: 502, .. })));
    }

    #[test]
    fn test_http_api_debug_redacts_token() {
        let api = HttpApi::new("http://localhost:8080/", "tm_secret").unwrap();
        let debug = format!("{:?}", api);
        assert!(debug.contains("http://localhost:8080"));
        assert!(!debug.contains("tm_secret"));
        assert_eq!(api.url("/v1/tasks"), "http://localhost:8080/v1/tasks");
    }

    #[test]
    fn test_http_api_rejects_bad_url() {
        assert!(matches!(
            HttpApi::new("localhost:8080", "t"),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
