//! Work-session ownership ledger.
//!
//! # Data Flow
//! ```text
//! compute service confirms a new work-session (POST /api/sessions → 201)
//!     → proxy intercepts the response body
//!     → create(user_id, session_id, email) appends a LedgerRecord
//!
//! GET /auth/session → lookup(user_id) → most recent record
//! status changes   → update_status(user_id, status)
//! teardown         → delete_all(user_id)
//! ```
//!
//! # Design Decisions
//! - This is the gateway's only persistent state beyond the cookie; it must
//!   outlive any single process, so the production backend is a file
//! - Every mutation is a full read-modify-rewrite; a single async writer
//!   lock inside each store serializes them so concurrent creates for the
//!   same user cannot interleave
//! - Unreadable storage surfaces as corruption (500) and is never silently
//!   repaired

pub mod record;
pub mod store;

pub use record::{LedgerRecord, WorkSessionStatus};
pub use store::{CsvLedger, LedgerError, LedgerStore, MemoryLedger};
