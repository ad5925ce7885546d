//! HTTP Inbound Adapter
//!
//! Axum-based HTTP server that drives the application layer, plus the
//! signed provider callback endpoint.

mod callbacks;
mod handlers;
mod server;

pub use handlers::ApiError;
pub use server::HttpServer;
