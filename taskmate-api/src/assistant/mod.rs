/// The task assistant
///
/// - `model`: Language model trait and message types
/// - `openai`: Streaming client for OpenAI-compatible APIs
/// - `tools`: The five task tools and their Postgres implementation
/// - `runner`: Model/tool loop for one chat turn

pub mod model;
pub mod openai;
pub mod runner;
pub mod tools;

pub use model::{ChatModel, ModelError};
pub use runner::{AssistantRunner, RunError, RunOutcome};
