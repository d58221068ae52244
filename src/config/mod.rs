//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! environment variables
//!     → loader.rs (capture & build typed config)
//!     → validation.rs (semantic checks, all errors collected)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no runtime reload
//! - Required secrets/URLs missing at startup abort the process with a
//!   complete list of problems, not just the first one found
//! - Exactly one auth mode is active; the identity-token mode wins when
//!   its client id is configured

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::ConfigError;
pub use schema::{
    AuthConfig, CorsConfig, Environment, GatewayConfig, IdTokenConfig, LedgerConfig, OidcConfig,
    RateLimitConfig, ServerConfig, SessionConfig, SessionPolicy, UpstreamConfig,
};
pub use validation::ValidationError;
