//! # Taskmate Client
//!
//! Headless client for the Taskmate API: the "add task" dialog and the
//! assistant chat widget as plain state machines, plus the HTTP plumbing
//! that drives them.
//!
//! ## Modules
//!
//! - `task_dialog`: Draft state and validation for new tasks
//! - `widget`: Chat widget state machine (history paging, streaming, tool status)
//! - `session`: Runs a widget against a [`api::ChatApi`] with cancellation
//! - `api`: HTTP client and event-stream decoding
//! - `messages`, `scroll`, `tool_status`: Widget building blocks
//! - `config`: Environment configuration for the CLI
//! - `prompt`: Interruptible line input for the CLI
//!
//! ## Example
//!
//! ```no_run
//! use taskmate_client::api::HttpApi;
//! use taskmate_client::session::ChatSession;
//! use taskmate_client::widget::ChatWidget;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let api = HttpApi::new("http://localhost:8080", "tm_...")?;
//! let mut session = ChatSession::new(api, ChatWidget::default());
//! session.open().await;
//!
//! let cancel = CancellationToken::new();
//! session.send("What's due today?", &cancel, |widget| {
//!     if let Some(reply) = widget.messages().last() {
//!         println!("{}", reply.display_content());
//!     }
//! }).await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod messages;
pub mod prompt;
pub mod scroll;
pub mod session;
pub mod task_dialog;
pub mod tool_status;
pub mod widget;
