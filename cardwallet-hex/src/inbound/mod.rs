//! HTTP Inbound Adapter
//!
//! Axum-based HTTP server that drives the application layer.

pub mod auth;
mod handlers;
mod rate_limit;
mod server;

pub use handlers::{ApiError, SIGNATURE_HEADER};
pub use server::HttpServer;
