//! Persistence module for downtally.
//!
//! All durable state lives behind [`KeyValueStore`]: a SQLite-backed store for
//! the service and an in-memory one for tests.

#[cfg(test)]
mod memory;
mod models;
mod store;

#[cfg(test)]
pub use memory::*;
pub use models::*;
pub use store::*;

/// Keys under which the observer persists its state.
pub mod keys {
    pub const DOWN_COUNTER: &str = "down_counter";
    pub const LAST_STATE: &str = "last_state";
    pub const LAST_CHECKED: &str = "last_checked";
    pub const DIAGNOSTICS: &str = "diagnostics";
    pub const RELAY_OVERRIDE: &str = "relay_override";
    pub const TARGET_URL: &str = "target_url";
    pub const DETECTION_PHRASE: &str = "detection_phrase";
    pub const HISTORY: &str = "history";
}

/// Key/value access to durable state.
///
/// Implementors provide raw string access; numbers and the history record are
/// layered on top and never fail on malformed data.
pub trait KeyValueStore: Send + Sync {
    fn read_string(&self, key: &str) -> Result<Option<String>, DbError>;

    fn save_string(&self, key: &str, value: &str) -> Result<(), DbError>;

    /// Read an integer, falling back to `default` when missing or unparsable.
    fn read_number(&self, key: &str, default: u64) -> Result<u64, DbError> {
        Ok(self
            .read_string(key)?
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(default))
    }

    /// Write several values together. Stores that can make this atomic should;
    /// the fallback writes in order and stops at the first failure.
    fn save_batch(&self, entries: &[(&str, String)]) -> Result<(), DbError> {
        for (key, value) in entries {
            self.save_string(key, value)?;
        }
        Ok(())
    }

    fn save_number(&self, key: &str, value: u64) -> Result<(), DbError> {
        self.save_string(key, &value.to_string())
    }

    /// Read the history record. Missing or malformed data yields an empty
    /// record of the requested shape, as does a record of the other shape.
    fn read_history(&self, mode: HistoryMode) -> Result<HistoryRecord, DbError> {
        let Some(raw) = self.read_string(keys::HISTORY)? else {
            return Ok(HistoryRecord::empty(mode));
        };

        match serde_json::from_str::<HistoryRecord>(&raw) {
            Ok(record) if record.matches(mode) => Ok(record),
            Ok(_) => {
                tracing::warn!("Stored history has a different retention mode, starting fresh");
                Ok(HistoryRecord::empty(mode))
            }
            Err(e) => {
                tracing::warn!("Discarding malformed history: {}", e);
                Ok(HistoryRecord::empty(mode))
            }
        }
    }

    fn save_history(&self, record: &HistoryRecord) -> Result<(), DbError> {
        let raw = serde_json::to_string(record)?;
        self.save_string(keys::HISTORY, &raw)
    }
}
