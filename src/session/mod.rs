//! Cookie-bound session persistence.
//!
//! # Data Flow
//! ```text
//! request Cookie header
//!     → cookie.rs (verify the HMAC tag, extract the session id)
//!     → store.rs (pluggable backend: memory or Redis)
//!     → SessionData { user, pkce } available to handlers
//!
//! on login: regenerate id (fixation defence) before attaching Identity
//! on logout: destroy record, clear cookie
//! ```
//!
//! # Design Decisions
//! - The signed session id is the only thing the client holds; all state
//!   is server-side
//! - Backend selection is configuration, not code: memory for a single
//!   instance, Redis when instances cannot assume stickiness

pub mod cookie;
pub mod store;

use serde::{Deserialize, Serialize};

use crate::auth::identity::Identity;
use crate::auth::pkce::PkceState;

/// Name of the HttpOnly session cookie.
pub const SESSION_COOKIE: &str = "rm_session";

/// Server-side session record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    /// Trusted identity, present once a login completed.
    #[serde(default)]
    pub user: Option<Identity>,

    /// In-flight PKCE exchange state. Write-once, read-once; cleared as
    /// soon as the callback is processed, successful or not.
    #[serde(default)]
    pub pkce: Option<PkceState>,
}

pub use store::{MemoryBackend, RedisBackend, SessionBackend, SessionError, SessionStore};
