//! # Taskmate Shared Library
//!
//! This crate contains shared types, storage and business logic used by
//! the Taskmate API server and the Taskmate client.
//!
//! ## Module Organization
//!
//! - `db`: Connection pool and migrations
//! - `models`: Database models and data structures
//! - `auth`: Password hashing, session tokens and session validation
//! - `chat`: Chat wire types shared by server and client
//! - `email`: Transactional email dispatch
//! - `redis`: Redis client used for rate limiting

pub mod auth;
pub mod chat;
pub mod db;
pub mod email;
pub mod models;
pub mod redis;

/// Current version of the Taskmate shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
