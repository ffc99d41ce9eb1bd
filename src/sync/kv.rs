//! Persistent key-value storage for serialized blobs.
//!
//! The sync layer only ever needs whole-blob `get`/`set`/`remove` by string
//! key. `SqliteKvStore` is the durable backend; `MemoryKvStore` backs tests
//! and ephemeral sessions.

use crate::protocol::DriverResult;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::Mutex;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> DriverResult<Option<String>>;

    /// Once this resolves the value survives a process restart.
    async fn set(&self, key: &str, value: &str) -> DriverResult<()>;

    async fn remove(&self, key: &str) -> DriverResult<()>;
}

/// SQLite-backed blob store: one row per key.
pub struct SqliteKvStore {
    conn: Mutex<Connection>,
}

impl SqliteKvStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DriverResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a store in `<data_dir>/sync.db`, creating the directory if needed
    pub fn open_in(data_dir: &Path) -> DriverResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| {
            crate::protocol::DriverError::StorageError(format!(
                "Failed to create {}: {}",
                data_dir.display(),
                e
            ))
        })?;
        Self::open(data_dir.join("sync.db"))
    }

    pub fn open_in_memory() -> DriverResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> DriverResult<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for SqliteKvStore {
    async fn get(&self, key: &str) -> DriverResult<Option<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT value FROM kv_store WHERE key = ?1")?;
        let value = stmt
            .query_row(params![key], |row| row.get::<_, String>(0))
            .optional()?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> DriverResult<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
             value = excluded.value,
             updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> DriverResult<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, key: &str) -> DriverResult<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> DriverResult<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> DriverResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}
