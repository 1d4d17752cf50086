/// Chat history and streamed completions
///
/// # Endpoints
///
/// - `GET  /v1/chat/history?cursor=&limit=` - Newest page first
/// - `POST /v1/chat/completions` - `text/event-stream` of chunks
///
/// # Stream
///
/// ```text
/// data: {"content":"","isStreaming":true,"isComplete":false,"userMessageId":41}
/// data: {"content":"Adding","isStreaming":true,"isComplete":false}
/// data: {"content":"Adding","isStreaming":true,"isComplete":false,"toolCall":{"name":"createTaskTool"}}
/// data: {"content":"Adding it. Done!","isStreaming":false,"isComplete":true,"assistantMessageId":42}
/// data: [DONE]
/// ```
///
/// A failed model call ends the stream with
/// `{"content":"","isStreaming":false,"isComplete":true,"error":"..."}`
/// instead of a completed reply.

use crate::{
    app::{AppState, TIMEZONE_HEADER},
    assistant::{
        runner::{build_conversation, system_prompt},
        tools::PgTaskTools,
        AssistantRunner, RunError,
    },
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
    Extension, Json,
};
use futures::{stream, Stream, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use taskmate_shared::{
    auth::session::AuthContext,
    chat::{
        parse_cursor, ChatChunk, CompletionRequest, HistoryMessage, HistoryPage,
        DEFAULT_HISTORY_LIMIT, DONE_SENTINEL, MAX_HISTORY_LIMIT,
    },
    models::chat_message::{ChatMessage, ChatRole},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub const DEFAULT_TIME_ZONE: &str = "UTC";

/// Shown when the model produced no text at all
const EMPTY_REPLY: &str = "I'm not sure how to help with that.";

/// Shown when the model call fails; not persisted
const FAILED_REPLY: &str = "Sorry, I couldn't reach the assistant. Please try again.";

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

/// Page size, clamped to `1..=MAX_HISTORY_LIMIT`
pub fn history_limit(requested: Option<i64>) -> i64 {
    requested
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT)
}

/// Accepts IANA-style names (`Europe/Berlin`, `Etc/GMT+2`, `UTC`)
pub fn sanitize_time_zone(raw: &str) -> Option<String> {
    let tz = raw.trim();
    let valid = !tz.is_empty()
        && tz.len() <= 64
        && tz
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-' | '+'));
    valid.then(|| tz.to_string())
}

/// Header first, then the body field, then UTC
pub fn resolve_time_zone(headers: &HeaderMap, body: Option<&str>) -> String {
    headers
        .get(TIMEZONE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(sanitize_time_zone)
        .or_else(|| body.and_then(sanitize_time_zone))
        .unwrap_or_else(|| DEFAULT_TIME_ZONE.to_string())
}

pub async fn history(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<HistoryPage>> {
    let before_id = match query.cursor.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        None => None,
        Some(cursor) => Some(
            parse_cursor(cursor)
                .ok_or_else(|| ApiError::BadRequest(format!("Invalid cursor: {}", cursor)))?,
        ),
    };

    let (messages, has_more) = ChatMessage::page_for_user(
        &state.db,
        auth.user_id,
        before_id,
        history_limit(query.limit),
    )
    .await?;

    Ok(Json(HistoryPage::from_messages(
        messages.into_iter().map(HistoryMessage::from).collect(),
        has_more,
    )))
}

/// Runs one assistant turn, feeding chunks into `tx`
async fn drive_turn(
    state: AppState,
    user_id: i32,
    runner: AssistantRunner,
    request: CompletionRequest,
    time_zone: String,
    user_message_id: i32,
    tx: mpsc::Sender<ChatChunk>,
) {
    if tx
        .send(ChatChunk::streaming("").with_user_message_id(user_message_id))
        .await
        .is_err()
    {
        return;
    }

    let conversation = build_conversation(
        system_prompt(chrono::Utc::now(), &time_zone),
        &request.messages,
    );

    let outcome = match runner.run(conversation, &tx).await {
        Ok(outcome) => outcome,
        Err(RunError::ClientGone) => {
            tracing::debug!(user_id = user_id, "Client left before the reply finished");
            return;
        }
        Err(RunError::Model(e)) => {
            tracing::error!(error = %e, user_id = user_id, "Assistant turn failed");
            let _ = tx.send(ChatChunk::failed(FAILED_REPLY)).await;
            return;
        }
    };

    let text = if outcome.text.trim().is_empty() {
        EMPTY_REPLY.to_string()
    } else {
        outcome.text
    };

    let saved = match ChatMessage::create(&state.db, user_id, ChatRole::Assistant, &text).await {
        Ok(message) => Some(message.id),
        Err(e) => {
            tracing::error!(error = %e, user_id = user_id, "Failed to save assistant reply");
            None
        }
    };

    tracing::info!(
        user_id = user_id,
        tools = outcome.tools_called.len(),
        "Assistant turn complete"
    );
    let _ = tx.send(ChatChunk::complete(text, saved)).await;
}

/// Streams an assistant reply to the newest user turn
///
/// # Errors
///
/// - `422`: The request doesn't end with a non-empty user message
/// - `503`: No language model is configured
pub async fn completions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    Json(request): Json<CompletionRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let model = state
        .model
        .clone()
        .ok_or_else(|| ApiError::ServiceUnavailable("The assistant is not configured".to_string()))?;

    let user_text = request
        .latest_user_message()
        .ok_or_else(|| ApiError::field("messages", "The last message must be a non-empty user message"))?
        .to_string();

    let time_zone = resolve_time_zone(&headers, request.time_zone.as_deref());
    let user_message = ChatMessage::create(&state.db, auth.user_id, ChatRole::User, &user_text).await?;

    tracing::debug!(user_id = auth.user_id, time_zone = %time_zone, "Starting assistant turn");

    let runner = AssistantRunner::new(
        model,
        Arc::new(PgTaskTools::new(state.db.clone(), auth.user_id)),
        state.config.llm.max_steps,
    );

    let (tx, rx) = mpsc::channel::<ChatChunk>(32);
    tokio::spawn(drive_turn(
        state,
        auth.user_id,
        runner,
        request,
        time_zone,
        user_message.id,
        tx,
    ));

    let events = ReceiverStream::new(rx)
        .map(|chunk| Event::default().json_data(chunk))
        .chain(stream::once(async { Ok(Event::default().data(DONE_SENTINEL)) }));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
