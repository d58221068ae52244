//! Ledger record types.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Lifecycle of one backend work-session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkSessionStatus {
    Created,
    Active,
    Completed,
    Failed,
}

impl WorkSessionStatus {
    /// Terminal records no longer count against the single-active policy.
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkSessionStatus::Completed | WorkSessionStatus::Failed)
    }
}

/// Ownership of one backend work-session by one identity. Column layout is
/// fixed: `user_id, session_id, created_at, last_updated, status, email`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub user_id: String,
    pub session_id: String,
    /// Unix epoch milliseconds.
    pub created_at: u64,
    /// Unix epoch milliseconds, refreshed on every status change.
    pub last_updated: u64,
    pub status: WorkSessionStatus,
    pub email: String,
}

impl LedgerRecord {
    pub fn new(user_id: &str, session_id: &str, email: &str) -> Self {
        let now = now_millis();
        Self {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            created_at: now,
            last_updated: now,
            status: WorkSessionStatus::Created,
            email: email.to_string(),
        }
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
