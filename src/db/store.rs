//! SQLite key/value store implementation.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::KeyValueStore;

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

/// Thread-safe SQLite store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the store at the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }
}

impl KeyValueStore for Store {
    fn read_string(&self, key: &str) -> Result<Option<String>, DbError> {
        let conn = self.conn()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn save_string(&self, key: &str, value: &str) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at",
            params![key, value],
        )?;
        Ok(())
    }

    fn save_batch(&self, entries: &[(&str, String)]) -> Result<(), DbError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
                 ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at",
            )?;

            for (key, value) in entries {
                stmt.execute(params![key, value])?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{keys, HistoryMode, HistoryRecord};
    use tempfile::NamedTempFile;

    #[test]
    fn test_kv_roundtrip() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();

        assert_eq!(store.read_string(keys::LAST_STATE).unwrap(), None);
        store.save_string(keys::LAST_STATE, "down").unwrap();
        store.save_string(keys::LAST_STATE, "up").unwrap();
        assert_eq!(store.read_string(keys::LAST_STATE).unwrap().as_deref(), Some("up"));

        store.save_number(keys::DOWN_COUNTER, 7).unwrap();
        assert_eq!(store.read_number(keys::DOWN_COUNTER, 0).unwrap(), 7);
    }

    #[test]
    fn test_reopen_keeps_values() {
        let tmp = NamedTempFile::new().unwrap();
        {
            let store = Store::new(tmp.path()).unwrap();
            store.save_number(keys::DOWN_COUNTER, 3).unwrap();
        }
        let store = Store::new(tmp.path()).unwrap();
        assert_eq!(store.read_number(keys::DOWN_COUNTER, 0).unwrap(), 3);
    }

    #[test]
    fn test_save_batch_writes_all() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        store.save_string(keys::DOWN_COUNTER, "1").unwrap();

        store
            .save_batch(&[
                (keys::HISTORY, "[]".to_string()),
                (keys::DOWN_COUNTER, "2".to_string()),
            ])
            .unwrap();
        assert_eq!(store.read_number(keys::DOWN_COUNTER, 0).unwrap(), 2);
        assert_eq!(store.read_string(keys::HISTORY).unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_invalid_number_falls_back() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        store.save_string(keys::DOWN_COUNTER, "twelve").unwrap();
        assert_eq!(store.read_number(keys::DOWN_COUNTER, 5).unwrap(), 5);
    }

    #[test]
    fn test_malformed_history_reads_empty() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        store.save_string(keys::HISTORY, "{not json").unwrap();

        let record = store.read_history(HistoryMode::Daily).unwrap();
        assert_eq!(record, HistoryRecord::empty(HistoryMode::Daily));
    }
}
