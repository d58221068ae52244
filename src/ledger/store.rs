//! Ledger storage backends.
//!
//! # Responsibilities
//! - lookup / create / update_status / delete_all keyed by user id
//! - Serialize all mutations behind a per-store writer lock
//! - CSV file backend with atomic rewrite (temp file + rename)
//!
//! # Design Decisions
//! - `create` applies the configured ownership policy: single-active drops
//!   prior records for the user before appending; multi appends as-is
//! - File I/O runs on the blocking pool; the lock is held across the whole
//!   read-modify-rewrite cycle

use async_trait::async_trait;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::config::SessionPolicy;
use crate::ledger::record::{now_millis, LedgerRecord, WorkSessionStatus};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger storage unreadable: {0}")]
    Corrupt(String),

    #[error("ledger io error: {0}")]
    Io(#[from] io::Error),
}

/// Durable identity → work-session mapping.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Most-recently-updated record for the user, if any.
    async fn lookup(&self, user_id: &str) -> Result<Option<LedgerRecord>, LedgerError>;

    /// Register a new work-session, honouring the ownership policy.
    async fn create(
        &self,
        user_id: &str,
        session_id: &str,
        email: &str,
    ) -> Result<LedgerRecord, LedgerError>;

    /// Rewrite the user's record(s) with a new status and fresh timestamp.
    async fn update_status(
        &self,
        user_id: &str,
        status: WorkSessionStatus,
    ) -> Result<(), LedgerError>;

    /// Remove every record for the user.
    async fn delete_all(&self, user_id: &str) -> Result<(), LedgerError>;
}

fn most_recent(rows: &[LedgerRecord], user_id: &str) -> Option<LedgerRecord> {
    rows.iter()
        .filter(|r| r.user_id == user_id)
        .max_by_key(|r| r.last_updated)
        .cloned()
}

fn apply_create(
    rows: &mut Vec<LedgerRecord>,
    policy: SessionPolicy,
    record: LedgerRecord,
) -> LedgerRecord {
    if policy == SessionPolicy::SingleActive {
        rows.retain(|r| r.user_id != record.user_id);
    }
    rows.push(record.clone());
    record
}

fn apply_update(rows: &mut [LedgerRecord], user_id: &str, status: WorkSessionStatus) {
    let now = now_millis();
    for row in rows.iter_mut().filter(|r| r.user_id == user_id) {
        row.status = status;
        row.last_updated = now;
    }
}

/// Flat-file CSV backend. The production ledger.
pub struct CsvLedger {
    path: PathBuf,
    policy: SessionPolicy,
    // Single writer: every operation's read-modify-rewrite runs under this.
    lock: Mutex<()>,
}

impl CsvLedger {
    pub fn new(path: impl Into<PathBuf>, policy: SessionPolicy) -> Result<Self, LedgerError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        // Seed an empty file with the header row so a fresh deployment
        // starts from a readable ledger.
        if !path.exists() {
            write_rows(&path, &[])?;
        }
        Ok(Self {
            path,
            policy,
            lock: Mutex::new(()),
        })
    }

    async fn read_all(&self) -> Result<Vec<LedgerRecord>, LedgerError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_rows(&path))
            .await
            .map_err(|e| LedgerError::Corrupt(e.to_string()))?
    }

    async fn write_all(&self, rows: Vec<LedgerRecord>) -> Result<(), LedgerError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_rows(&path, &rows))
            .await
            .map_err(|e| LedgerError::Corrupt(e.to_string()))?
    }
}

fn read_rows(path: &Path) -> Result<Vec<LedgerRecord>, LedgerError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| LedgerError::Corrupt(format!("{}: {}", path.display(), e)))?;
    let mut rows = Vec::new();
    for result in reader.deserialize() {
        let record: LedgerRecord =
            result.map_err(|e| LedgerError::Corrupt(format!("{}: {}", path.display(), e)))?;
        rows.push(record);
    }
    Ok(rows)
}

fn write_rows(path: &Path, rows: &[LedgerRecord]) -> Result<(), LedgerError> {
    let tmp = path.with_extension("tmp");
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&tmp)
            .map_err(|e| LedgerError::Corrupt(format!("{}: {}", tmp.display(), e)))?;
        writer
            .write_record([
                "user_id",
                "session_id",
                "created_at",
                "last_updated",
                "status",
                "email",
            ])
            .map_err(|e| LedgerError::Corrupt(e.to_string()))?;
        for row in rows {
            writer
                .serialize(row)
                .map_err(|e| LedgerError::Corrupt(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| LedgerError::Corrupt(e.to_string()))?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[async_trait]
impl LedgerStore for CsvLedger {
    async fn lookup(&self, user_id: &str) -> Result<Option<LedgerRecord>, LedgerError> {
        let _guard = self.lock.lock().await;
        let rows = self.read_all().await?;
        Ok(most_recent(&rows, user_id))
    }

    async fn create(
        &self,
        user_id: &str,
        session_id: &str,
        email: &str,
    ) -> Result<LedgerRecord, LedgerError> {
        let _guard = self.lock.lock().await;
        let mut rows = self.read_all().await?;
        let record = apply_create(
            &mut rows,
            self.policy,
            LedgerRecord::new(user_id, session_id, email),
        );
        self.write_all(rows).await?;
        tracing::info!(user_id = %user_id, session_id = %session_id, "Work-session recorded");
        Ok(record)
    }

    async fn update_status(
        &self,
        user_id: &str,
        status: WorkSessionStatus,
    ) -> Result<(), LedgerError> {
        let _guard = self.lock.lock().await;
        let mut rows = self.read_all().await?;
        apply_update(&mut rows, user_id, status);
        self.write_all(rows).await?;
        tracing::info!(user_id = %user_id, status = ?status, "Work-session status updated");
        Ok(())
    }

    async fn delete_all(&self, user_id: &str) -> Result<(), LedgerError> {
        let _guard = self.lock.lock().await;
        let mut rows = self.read_all().await?;
        rows.retain(|r| r.user_id != user_id);
        self.write_all(rows).await?;
        tracing::info!(user_id = %user_id, "Work-sessions deleted");
        Ok(())
    }
}

/// In-memory backend for tests and throwaway deployments.
pub struct MemoryLedger {
    rows: Mutex<Vec<LedgerRecord>>,
    policy: SessionPolicy,
}

impl MemoryLedger {
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            policy,
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn lookup(&self, user_id: &str) -> Result<Option<LedgerRecord>, LedgerError> {
        let rows = self.rows.lock().await;
        Ok(most_recent(&rows, user_id))
    }

    async fn create(
        &self,
        user_id: &str,
        session_id: &str,
        email: &str,
    ) -> Result<LedgerRecord, LedgerError> {
        let mut rows = self.rows.lock().await;
        Ok(apply_create(
            &mut rows,
            self.policy,
            LedgerRecord::new(user_id, session_id, email),
        ))
    }

    async fn update_status(
        &self,
        user_id: &str,
        status: WorkSessionStatus,
    ) -> Result<(), LedgerError> {
        let mut rows = self.rows.lock().await;
        apply_update(&mut rows, user_id, status);
        Ok(())
    }

    async fn delete_all(&self, user_id: &str) -> Result<(), LedgerError> {
        let mut rows = self.rows.lock().await;
        rows.retain(|r| r.user_id != user_id);
        Ok(())
    }
}
