//! In-memory store for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{DbError, KeyValueStore};

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn read_string(&self, key: &str) -> Result<Option<String>, DbError> {
        let values = self.values.lock().map_err(|_| DbError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn save_string(&self, key: &str, value: &str) -> Result<(), DbError> {
        let mut values = self.values.lock().map_err(|_| DbError::Poisoned)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn save_batch(&self, entries: &[(&str, String)]) -> Result<(), DbError> {
        let mut values = self.values.lock().map_err(|_| DbError::Poisoned)?;
        for (key, value) in entries {
            values.insert(key.to_string(), value.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{keys, HistoryMode, HistoryRecord};

    #[test]
    fn test_missing_values_use_defaults() {
        let store = MemoryStore::new();
        assert_eq!(store.read_number(keys::DOWN_COUNTER, 0).unwrap(), 0);
        assert_eq!(
            store.read_history(HistoryMode::Log { max: 5 }).unwrap(),
            HistoryRecord::empty(HistoryMode::Log { max: 5 })
        );
    }

    #[test]
    fn test_history_of_other_mode_is_discarded() {
        let store = MemoryStore::new();
        let daily = HistoryRecord::Daily([("2024-01-01".to_string(), 1)].into());
        store.save_history(&daily).unwrap();
        assert_eq!(store.read_history(HistoryMode::Daily).unwrap(), daily);

        let record = store.read_history(HistoryMode::Log { max: 5 }).unwrap();
        assert!(record.is_empty());
    }
}
