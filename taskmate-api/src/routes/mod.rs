/// API route handlers
///
/// - `health`: Health check endpoint
/// - `auth`: Registration, login, magic links, password reset, email verification
/// - `oauth`: Google and GitHub sign-in
/// - `account`: Current user, profile and account deletion
/// - `tasks`: Task and subtask CRUD
/// - `chat`: Chat history and streamed completions

pub mod account;
pub mod auth;
pub mod chat;
pub mod health;
pub mod oauth;
pub mod tasks;
