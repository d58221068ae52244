//! Authenticated reverse proxy to the compute service.
//!
//! # Data Flow
//! ```text
//! /api/* request
//!     → session lookup (401 before any upstream contact)
//!     → single-active policy pre-flight (409 on a second creation attempt)
//!     → header sanitation (client x-user-* stripped, session identity injected)
//!     → compute service (bounded by the long-operation timeout)
//!     → on POST /api/sessions + 201: body intercepted, ledger updated async
//!     → response streamed back
//! ```
//!
//! # Design Decisions
//! - Authorization passes through verbatim so the compute service can run
//!   its own verification
//! - Connectivity failures map to 502, timeouts to 504; both distinct from
//!   401 and 429 so clients can tell the failure classes apart

pub mod gateway;

pub use gateway::{api_health, proxy_handler, X_USER_EMAIL, X_USER_ID};
