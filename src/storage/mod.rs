//! Key-value preference storage.
//!
//! Provides the [`PreferenceStore`] trait and two backends: an in-memory
//! map for tests and embedding, and [`SqlitePreferenceStore`] for hosts
//! that keep preferences across sessions.

pub mod preferences;

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;

pub use preferences::{
    load_preferences, read_preferences, save_preferences, write_preferences, UserPreferences,
    PREFERENCES_KEY, PREFERENCES_VERSION,
};

/// A string key-value store holding opaque records.
pub trait PreferenceStore: Send + Sync + std::fmt::Debug {
    /// Read a value. `Ok(None)` when the key was never written.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

/// SQLite-backed store: one `preferences` table keyed by name.
#[derive(Debug)]
pub struct SqlitePreferenceStore {
    /// Path to the database file, `:memory:` for a private in-memory db.
    pub db_path: String,
    conn: Mutex<Connection>,
}

impl SqlitePreferenceStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::with_connection(path.display().to_string(), conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(":memory:".to_string(), Connection::open_in_memory()?)
    }

    fn with_connection(db_path: String, conn: Connection) -> Result<Self, StoreError> {
        let store = Self {
            db_path,
            conn: Mutex::new(conn),
        };
        store.init_db()?;
        Ok(store)
    }

    fn init_db(&self) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "CREATE TABLE IF NOT EXISTS preferences (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at DATETIME NOT NULL
            )",
            [],
        )?;
        Ok(())
    }
}

impl PreferenceStore for SqlitePreferenceStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn.lock().execute(
            "INSERT INTO preferences (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE
             SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        log::debug!("SqlitePreferenceStore::set: key={}", key);
        Ok(())
    }
}
