//! Shared setup for API integration tests
//!
//! Tests that need Postgres call `TestContext::new()` and return early when
//! it yields `None` (no `DATABASE_URL`).

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::Value;
use sqlx::PgPool;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use taskmate_api::{
    app::{build_router, AppState},
    assistant::model::{ChatModel, ModelError, ModelEvent, ModelMessage, ToolDefinition},
    config::Config,
};
use taskmate_shared::{
    db::{
        migrations::run_migrations,
        pool::{create_pool, DatabaseConfig},
    },
    email::{EmailError, EmailMessage, EmailSender},
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Keeps every email instead of sending it
#[derive(Default)]
pub struct RecordingEmailSender {
    pub sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingEmailSender {
    /// Token from the last link mailed to `to`
    pub fn last_token_for(&self, to: &str) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        let message = sent.iter().rev().find(|m| m.to == to)?;
        let start = message.html.find("token=")? + "token=".len();
        Some(
            message.html[start..]
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric())
                .collect(),
        )
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, message: EmailMessage) -> Result<(), EmailError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

/// Plays back one list of events per model round
#[derive(Default)]
pub struct ScriptedModel {
    rounds: Mutex<VecDeque<Vec<ModelEvent>>>,
}

impl ScriptedModel {
    pub fn new(rounds: Vec<Vec<ModelEvent>>) -> Self {
        Self {
            rounds: Mutex::new(rounds.into()),
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn stream(
        &self,
        _messages: &[ModelMessage],
        _tools: &[ToolDefinition],
        events: mpsc::Sender<ModelEvent>,
    ) -> Result<(), ModelError> {
        let round = self.rounds.lock().unwrap().pop_front().unwrap_or_default();
        for event in round {
            events.send(event).await.map_err(|_| ModelError::Cancelled)?;
        }
        events
            .send(ModelEvent::Finished)
            .await
            .map_err(|_| ModelError::Cancelled)
    }
}

/// Fails every call as if the provider were unreachable
pub struct UnreachableModel;

#[async_trait]
impl ChatModel for UnreachableModel {
    async fn stream(
        &self,
        _messages: &[ModelMessage],
        _tools: &[ToolDefinition],
        _events: mpsc::Sender<ModelEvent>,
    ) -> Result<(), ModelError> {
        Err(ModelError::Transport("connection refused".into()))
    }
}

pub struct TestContext {
    pub db: PgPool,
    pub app: Router,
    pub emails: Arc<RecordingEmailSender>,
}

impl TestContext {
    pub async fn new() -> Option<Self> {
        Self::with_model(None).await
    }

    pub async fn with_model(model: Option<Arc<dyn ChatModel>>) -> Option<Self> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let db = create_pool(DatabaseConfig::from_url(&url)).await.expect("pool");
        run_migrations(&db).await.expect("migrations");

        let emails = Arc::new(RecordingEmailSender::default());
        let mut state = AppState::new(db.clone(), Config::for_database(url)).with_email(emails.clone());
        if let Some(model) = model {
            state = state.with_model(model);
        }

        Some(Self {
            db,
            app: build_router(state),
            emails,
        })
    }

    /// Sends a request and returns status plus the raw body
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    /// Like `send`, parsing the body as JSON (`Null` when empty)
    pub async fn json(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, bytes) = self.send(method, uri, token, body).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// Registers a fresh user and returns `(email, session token)`
    pub async fn register(&self) -> (String, String) {
        let email = format!("{}@test.taskmate", Uuid::new_v4());
        let (status, body) = self
            .json(
                "POST",
                "/v1/auth/register",
                None,
                Some(serde_json::json!({"email": email, "password": "buy-milk-2024"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        (email, body["token"].as_str().unwrap().to_string())
    }
}

/// Payloads of `data:` lines in an SSE body
pub fn sse_data(body: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(body)
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.trim_start().to_string())
        .collect()
}
