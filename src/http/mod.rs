//! HTTP surface of the gateway.
//!
//! # Data Flow
//! ```text
//! Browser request
//!     → server.rs (Axum setup, CORS, request IDs, security headers)
//!     → rate limit middleware (per endpoint class)
//!     → /auth/* handlers  (auth::routes)
//!     → /api/*  proxy     (proxy::gateway)
//! ```

pub mod server;

pub use server::{AppState, HttpServer};
