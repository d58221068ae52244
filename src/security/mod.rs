//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (fixed-window per-IP limits, per endpoint class)
//!     → handlers / proxy
//! Outgoing response:
//!     → headers.rs (stamp CSP + hardening headers)
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - No trust in client input: identity headers come from the session only
//! - The header policy is a static table per environment, not a state machine

pub mod headers;
pub mod rate_limit;

pub use headers::SecurityHeaderPolicy;
pub use rate_limit::{RateDecision, RateLimiter};
