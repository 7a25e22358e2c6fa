//! History aggregation: daily buckets or a capped observation log.

use chrono::{DateTime, Utc};

use crate::db::{
    day_key, keys, DbError, Health, HistoryEntry, HistoryMode, HistoryRecord, KeyValueStore, ObserverState,
};

use super::tracker::state_entries;

/// Transport tag for manually applied increments.
pub const MANUAL: &str = "manual";

/// Default cap for the observation log.
pub const DEFAULT_LOG_CAP: usize = 500;

/// One thing worth remembering about a probe cycle or manual action.
#[derive(Debug, Clone)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub state: Health,
    /// Counter value after this observation.
    pub counter: u64,
    pub transport: String,
    /// How much the counter moved: 0 or 1.
    pub delta: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct HistoryAggregator {
    mode: HistoryMode,
}

impl HistoryAggregator {
    pub fn new(mode: HistoryMode) -> Self {
        let mode = match mode {
            HistoryMode::Log { max } => HistoryMode::Log { max: max.max(1) },
            daily => daily,
        };
        Self { mode }
    }

    pub fn mode(&self) -> HistoryMode {
        self.mode
    }

    /// Fold an observation into `record`.
    pub fn apply(&self, record: &mut HistoryRecord, obs: &Observation) {
        if !record.matches(self.mode) {
            *record = HistoryRecord::empty(self.mode);
        }

        match (&mut *record, self.mode) {
            (HistoryRecord::Daily(days), HistoryMode::Daily) => {
                *days.entry(day_key(obs.timestamp)).or_insert(0) += obs.delta;
            }
            (HistoryRecord::Log(entries), HistoryMode::Log { .. }) => {
                entries.push_back(HistoryEntry {
                    timestamp: obs.timestamp,
                    state: obs.state,
                    counter: obs.counter,
                    transport: obs.transport.clone(),
                    delta: obs.delta,
                });
            }
            // Shape was reset to match the mode above.
            _ => {}
        }

        self.enforce_cap(record);
    }

    /// Drop the oldest log entries until the record fits the configured cap.
    pub fn enforce_cap(&self, record: &mut HistoryRecord) {
        if let (HistoryRecord::Log(entries), HistoryMode::Log { max }) = (record, self.mode) {
            while entries.len() > max {
                entries.pop_front();
            }
        }
    }

    /// Fold `obs` into the stored history and write it together with `state`.
    ///
    /// History leads the batch: if it fails, the state is not written.
    pub fn record(
        &self,
        store: &dyn KeyValueStore,
        obs: &Observation,
        state: &ObserverState,
    ) -> Result<HistoryRecord, DbError> {
        let mut record = store.read_history(self.mode)?;
        self.apply(&mut record, obs);

        let mut entries = vec![(keys::HISTORY, serde_json::to_string(&record)?)];
        entries.extend(state_entries(state));
        store.save_batch(&entries)?;
        Ok(record)
    }
}
