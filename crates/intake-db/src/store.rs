//! Durable storage for the persisted session identifier.

use crate::pool::DbPool;
use rusqlite::OptionalExtension;
use std::sync::Mutex;
use thiserror::Error;

/// Key under which the session identifier is stored.
pub const SESSION_KEY: &str = "intake.session_id";

/// Errors that can occur while reading or writing the session store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No pooled connection was available.
    #[error("session store connection error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A database operation failed.
    #[error("session store database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Reads and writes the single opaque session identifier.
///
/// Implementations are synchronous: every call is one short statement, and
/// callers never hold any lock across it.
pub trait SessionStore: Send + Sync {
    /// Returns the persisted identifier, if any.
    fn load(&self) -> Result<Option<String>, StoreError>;

    /// Persists `session_id`, replacing any previous value.
    fn save(&self, session_id: &str) -> Result<(), StoreError>;

    /// Removes the persisted identifier. Clearing an empty store is a no-op.
    fn clear(&self) -> Result<(), StoreError>;
}

/// SQLite-backed [`SessionStore`].
#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    pool: DbPool,
}

impl SqliteSessionStore {
    /// Wraps a pool whose database has already been migrated.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl SessionStore for SqliteSessionStore {
    fn load(&self) -> Result<Option<String>, StoreError> {
        let conn = self.pool.get()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                [SESSION_KEY],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value.filter(|v| !v.is_empty()))
    }

    fn save(&self, session_id: &str) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
            [SESSION_KEY, session_id],
        )?;
        tracing::debug!(session_id, "persisted session id");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        let removed = conn.execute("DELETE FROM kv_store WHERE key = ?1", [SESSION_KEY])?;
        tracing::debug!(removed, "cleared persisted session id");
        Ok(())
    }
}

/// In-process [`SessionStore`] for tests and hosts without a disk.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    value: Mutex<Option<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `session_id`.
    pub fn with_session(session_id: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(Some(session_id.into())),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        match self.value.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("session store lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<String>, StoreError> {
        Ok(self.slot().clone())
    }

    fn save(&self, session_id: &str) -> Result<(), StoreError> {
        *self.slot() = Some(session_id.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.slot() = None;
        Ok(())
    }
}
