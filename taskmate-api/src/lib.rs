//! # Taskmate API Server Library
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `assistant`: Language model client, task tools and the tool-calling loop
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Security headers and completion rate limiting
//! - `routes`: API route handlers

pub mod app;
pub mod assistant;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
