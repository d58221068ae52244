//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! GET /auth/login
//!     → pkce.rs (verifier + challenge + state)
//!     → flow.rs (NoFlow → AwaitingCallback)
//!     → redirect to issuer /authorize
//!
//! GET /auth/callback
//!     → flow.rs (pure transition: callback query → token exchange or failure)
//!     → oidc.rs (code exchange, userinfo fetch)
//!     → session regenerated, Identity attached
//!
//! POST /auth/login {idToken}
//!     → verifier.rs (remote introspection + claim checks)
//!     → session regenerated, Identity attached
//! ```
//!
//! # Design Decisions
//! - The PKCE flow is an explicit state machine with pure transitions;
//!   issuer I/O sits behind a trait so the machine tests without a network
//! - Fail closed: any issuer error or claim mismatch ends the flow, clears
//!   transient state and requires a fresh /auth/login
//! - Identity is only ever produced here; nothing downstream trusts
//!   client-supplied identity headers

pub mod flow;
pub mod identity;
pub mod oidc;
pub mod pkce;
pub mod routes;
pub mod verifier;

pub use identity::Identity;
pub use pkce::PkceState;
