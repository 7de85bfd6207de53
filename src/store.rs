//! Persistence of encrypted secret messages
//!
//! The store only ever sees ciphertext. It hands out a freshly generated id
//! on insert and looks records up by that id.

use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ErrorCategory, ErrorKind, RecretError, Result};

/// Opaque identifier of a stored secret, embedded in its shareable link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SecretId(String);

impl SecretId {
    /// A new random (v4 UUID) id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SecretId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A stored secret. `ciphertext` is the armored output of
/// [`crate::encryption::encrypt`]; plaintext never reaches the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretMessage {
    pub id: SecretId,
    pub ciphertext: String,
}

/// Key-value persistence boundary for secrets.
///
/// Implementations must give read-your-writes for a given id. Records are
/// never updated or deleted.
pub trait MessageStore: Send + Sync {
    /// Persist `ciphertext` under a newly generated id.
    fn create(&self, ciphertext: &str) -> Result<SecretId>;

    /// Look up a secret. Unknown ids are `Ok(None)`, not an error.
    fn find_by_id(&self, id: &str) -> Result<Option<SecretMessage>>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY NOT NULL,
    message TEXT NOT NULL
);
";

/// SQLite-backed store over a single connection.
///
/// Open it once at startup, share it, and call [`close`](Self::close) at
/// shutdown. Operations after `close` fail with [`ErrorKind::Storage`].
pub struct SqliteStore {
    conn: Mutex<Option<Connection>>,
}

impl SqliteStore {
    /// Open or create the database file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                RecretError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    format!("failed to create directory {}", parent.display()),
                    e,
                )
            })?;
        }

        let conn = Connection::open(path).map_err(|e| {
            RecretError::storage(format!("failed to open database {}", path.display()), e)
        })?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))
            .map_err(|e| RecretError::storage("failed to enable WAL journal mode", e))?;

        tracing::info!(path = %path.display(), "opened message store");
        Self::with_schema(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RecretError::storage("failed to open in-memory database", e))?;
        Self::with_schema(conn)
    }

    fn with_schema(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| RecretError::storage("failed to initialize schema", e))?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Release the underlying connection. Idempotent.
    pub fn close(&self) -> Result<()> {
        let Some(conn) = self.lock()?.take() else {
            return Ok(());
        };
        conn.close()
            .map_err(|(_, e)| RecretError::storage("failed to close database", e))?;
        tracing::info!("closed message store");
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>> {
        self.conn.lock().map_err(|e| {
            RecretError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::Storage,
                format!("database lock poisoned: {}", e),
            )
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let guard = self.lock()?;
        let conn = guard.as_ref().ok_or_else(|| {
            RecretError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::Storage,
                "message store is closed",
            )
        })?;
        f(conn).map_err(|e| RecretError::storage(format!("database error: {}", e), e))
    }
}

impl MessageStore for SqliteStore {
    fn create(&self, ciphertext: &str) -> Result<SecretId> {
        let id = SecretId::generate();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, message) VALUES (?1, ?2)",
                params![id.as_str(), ciphertext],
            )
        })?;
        Ok(id)
    }

    fn find_by_id(&self, id: &str) -> Result<Option<SecretMessage>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, message FROM messages WHERE id = ?1",
                params![id],
                |row| {
                    Ok(SecretMessage {
                        id: SecretId(row.get(0)?),
                        ciphertext: row.get(1)?,
                    })
                },
            )
            .optional()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_then_find() {
        let store = SqliteStore::open_in_memory().unwrap();

        let id = store.create("recret1:abc").unwrap();
        let found = store.find_by_id(id.as_str()).unwrap().unwrap();

        assert_eq!(found.id, id);
        assert_eq!(found.ciphertext, "recret1:abc");
    }

    #[test]
    fn test_ids_are_unique_uuids() {
        let store = SqliteStore::open_in_memory().unwrap();

        let a = store.create("one").unwrap();
        let b = store.create("two").unwrap();

        assert_ne!(a, b);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
        assert_eq!(store.find_by_id(b.as_str()).unwrap().unwrap().ciphertext, "two");
    }

    #[test]
    fn test_unknown_id_is_none() {
        let store = SqliteStore::open_in_memory().unwrap();

        assert_eq!(store.find_by_id("does-not-exist").unwrap(), None);
        assert_eq!(store.find_by_id("").unwrap(), None);
    }

    #[test]
    fn test_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("recret.db");

        let store = SqliteStore::open(&path).unwrap();
        let id = store.create("recret1:persisted").unwrap();
        store.close().unwrap();

        let store = SqliteStore::open(&path).unwrap();
        let found = store.find_by_id(id.as_str()).unwrap().unwrap();
        assert_eq!(found.ciphertext, "recret1:persisted");
    }

    #[test]
    fn test_closed_store_rejects_operations() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.close().unwrap();
        store.close().unwrap();

        let err = store.create("x").expect_err("expected closed store");
        assert_eq!(err.kind, Some(ErrorKind::Storage));
        assert_eq!(err.category, ErrorCategory::Internal);

        let err = store.find_by_id("x").expect_err("expected closed store");
        assert_eq!(err.kind, Some(ErrorKind::Storage));
    }
}
