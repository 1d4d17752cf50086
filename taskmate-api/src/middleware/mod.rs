/// Middleware for the API server
///
/// - `security`: Security headers on every response
/// - `rate_limit`: Per-user throttling of chat completions (Redis)

pub mod rate_limit;
pub mod security;
