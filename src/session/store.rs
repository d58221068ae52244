//! Session storage backends.
//!
//! # Responsibilities
//! - create/load/save/destroy keyed by an opaque session id
//! - Session-id regeneration on login (old id invalidated first)
//! - Expiry enforcement on load
//!
//! # Design Decisions
//! - Object-safe async trait so the backend is injected, not hardcoded
//! - Memory backend owns its map exclusively (no external locking needed);
//!   the Redis backend leans on Redis TTLs for expiry

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::session::SessionData;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session backend error: {0}")]
    Backend(String),

    #[error("session payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for SessionError {
    fn from(e: redis::RedisError) -> Self {
        SessionError::Backend(e.to_string())
    }
}

/// Pluggable session persistence.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<SessionData>, SessionError>;
    async fn save(&self, id: &str, data: &SessionData) -> Result<(), SessionError>;
    async fn destroy(&self, id: &str) -> Result<(), SessionError>;
}

/// In-process backend for single-instance deployments.
pub struct MemoryBackend {
    entries: DashMap<String, (SessionData, Instant)>,
    max_age: Duration,
}

impl MemoryBackend {
    pub fn new(max_age: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_age,
        }
    }
}

#[async_trait]
impl SessionBackend for MemoryBackend {
    async fn load(&self, id: &str) -> Result<Option<SessionData>, SessionError> {
        let expired = match self.entries.get(id) {
            Some(entry) if entry.1 > Instant::now() => return Ok(Some(entry.0.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(id);
        }
        Ok(None)
    }

    async fn save(&self, id: &str, data: &SessionData) -> Result<(), SessionError> {
        self.entries
            .insert(id.to_string(), (data.clone(), Instant::now() + self.max_age));
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<(), SessionError> {
        self.entries.remove(id);
        Ok(())
    }
}

/// Shared backend for horizontally-scaled deployments.
pub struct RedisBackend {
    conn: redis::aio::ConnectionManager,
    max_age: Duration,
}

impl RedisBackend {
    pub async fn connect(url: &str, max_age: Duration) -> Result<Self, SessionError> {
        let client = redis::Client::open(url)?;
        let conn = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self { conn, max_age })
    }

    fn key(id: &str) -> String {
        format!("session:{}", id)
    }
}

#[async_trait]
impl SessionBackend for RedisBackend {
    async fn load(&self, id: &str) -> Result<Option<SessionData>, SessionError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(Self::key(id))
            .query_async(&mut conn)
            .await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, id: &str, data: &SessionData) -> Result<(), SessionError> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(data)?;
        redis::cmd("SET")
            .arg(Self::key(id))
            .arg(json)
            .arg("PX")
            .arg(self.max_age.as_millis() as u64)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<(), SessionError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(Self::key(id))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}

/// Session store facade used by handlers.
pub struct SessionStore {
    backend: Box<dyn SessionBackend>,
}

impl SessionStore {
    pub fn new(backend: Box<dyn SessionBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory(max_age: Duration) -> Self {
        Self::new(Box::new(MemoryBackend::new(max_age)))
    }

    pub async fn redis(url: &str, max_age: Duration) -> Result<Self, SessionError> {
        Ok(Self::new(Box::new(RedisBackend::connect(url, max_age).await?)))
    }

    fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Create an empty session and return its id.
    pub async fn create(&self) -> Result<(String, SessionData), SessionError> {
        let id = Self::new_id();
        let data = SessionData::default();
        self.backend.save(&id, &data).await?;
        Ok((id, data))
    }

    pub async fn load(&self, id: &str) -> Result<Option<SessionData>, SessionError> {
        self.backend.load(id).await
    }

    pub async fn save(&self, id: &str, data: &SessionData) -> Result<(), SessionError> {
        self.backend.save(id, data).await
    }

    pub async fn destroy(&self, id: &str) -> Result<(), SessionError> {
        self.backend.destroy(id).await
    }

    /// Issue a fresh session id carrying `data`, invalidating `old_id`.
    /// Called on successful login, before trusted identity is attached, so
    /// a pre-login id planted on the victim's browser stops working.
    pub async fn regenerate(
        &self,
        old_id: Option<&str>,
        data: &SessionData,
    ) -> Result<String, SessionError> {
        if let Some(old) = old_id {
            self.backend.destroy(old).await?;
        }
        let id = Self::new_id();
        self.backend.save(&id, data).await?;
        Ok(id)
    }
}
