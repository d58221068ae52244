//! Authenticated gateway for the role-mining compute service.
//!
//! Sits between the browser SPA and the mining backend. Terminates two
//! login protocols (OAuth2 Authorization Code + PKCE, and server-side
//! verification of a pre-issued identity token), binds the resulting
//! identity to an HttpOnly cookie session, tracks work-session ownership
//! in a durable ledger, and reverse-proxies authorized `/api/*` traffic
//! to the compute service.

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod proxy;

// Identity & state
pub mod auth;
pub mod ledger;
pub mod session;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
