//! Persisted model types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;

/// Semantic state of the monitored endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Up,
    Down,
    #[default]
    Unknown,
}

impl Health {
    pub fn as_str(&self) -> &'static str {
        match self {
            Health::Up => "up",
            Health::Down => "down",
            Health::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Health {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "up" => Ok(Health::Up),
            "down" => Ok(Health::Down),
            "unknown" => Ok(Health::Unknown),
            other => Err(format!("invalid state: {}", other)),
        }
    }
}

/// The persisted observer singleton.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObserverState {
    pub last_state: Health,
    pub down_counter: u64,
    pub last_checked: Option<String>,
}

/// How the history record is retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryMode {
    /// One bucket per UTC day holding that day's down count.
    Daily,
    /// Time-ordered log capped at `max` entries.
    Log { max: usize },
}

/// One entry of the capped observation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub state: Health,
    pub counter: u64,
    pub transport: String,
    /// How much the counter moved with this entry.
    #[serde(default)]
    pub delta: u64,
}

/// The persisted history, in whichever shape the configured mode uses.
///
/// Serialized untagged: a daily record is a JSON object keyed by day, a log is
/// a JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HistoryRecord {
    Daily(BTreeMap<String, u64>),
    Log(VecDeque<HistoryEntry>),
}

impl HistoryRecord {
    /// An empty record of the shape `mode` expects.
    pub fn empty(mode: HistoryMode) -> Self {
        match mode {
            HistoryMode::Daily => HistoryRecord::Daily(BTreeMap::new()),
            HistoryMode::Log { .. } => HistoryRecord::Log(VecDeque::new()),
        }
    }

    pub fn matches(&self, mode: HistoryMode) -> bool {
        matches!(
            (self, mode),
            (HistoryRecord::Daily(_), HistoryMode::Daily)
                | (HistoryRecord::Log(_), HistoryMode::Log { .. })
        )
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        match self {
            HistoryRecord::Daily(days) => days.len(),
            HistoryRecord::Log(entries) => entries.len(),
        }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Daily counts for the `n` days ending at `today`, oldest first.
    ///
    /// Days without a bucket report zero. A log record is bucketed on the fly
    /// from each entry's delta.
    pub fn last_days(&self, n: u32, today: NaiveDate) -> Vec<(String, u64)> {
        let buckets = match self {
            HistoryRecord::Daily(days) => days.clone(),
            HistoryRecord::Log(entries) => {
                let mut days = BTreeMap::new();
                for entry in entries {
                    *days.entry(day_key(entry.timestamp)).or_insert(0) += entry.delta;
                }
                days
            }
        };

        (0..n)
            .rev()
            .filter_map(|back| today.checked_sub_days(chrono::Days::new(back as u64)))
            .map(|day| {
                let key = day.format("%Y-%m-%d").to_string();
                let count = buckets.get(&key).copied().unwrap_or(0);
                (key, count)
            })
            .collect()
    }
}

/// UTC day key used by the daily record.
pub fn day_key(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d").to_string()
}

/// One transport attempt as it appears in the diagnostic trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub transport: String,
    pub request_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Record of one probe cycle, kept for operator inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticSnapshot {
    pub probed_at: DateTime<Utc>,
    pub target: String,
    pub attempts: Vec<AttemptRecord>,
    /// Numeric status as a string, or the error token.
    pub final_status: String,
    pub final_ok: bool,
    pub state: Health,
    pub reason: String,
    pub body_snippet: String,
}

/// Exported document bundling everything the store knows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub total: u64,
    pub last_state: Health,
    pub last_checked: Option<String>,
    pub history: HistoryRecord,
    #[serde(default)]
    pub diagnostics: Option<DiagnosticSnapshot>,
    pub exported_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_health_parse() {
        assert_eq!("down".parse::<Health>().unwrap(), Health::Down);
        assert_eq!(" up\n".parse::<Health>().unwrap(), Health::Up);
        assert!("sideways".parse::<Health>().is_err());
    }

    #[test]
    fn test_history_shapes_serialize_untagged() {
        let daily = HistoryRecord::Daily(BTreeMap::from([("2024-03-01".to_string(), 2)]));
        assert_eq!(serde_json::to_string(&daily).unwrap(), r#"{"2024-03-01":2}"#);

        let back: HistoryRecord = serde_json::from_str("[]").unwrap();
        assert!(back.matches(HistoryMode::Log { max: 10 }));
    }

    #[test]
    fn test_last_days_fills_gaps() {
        let record = HistoryRecord::Daily(BTreeMap::from([
            ("2024-03-01".to_string(), 2),
            ("2024-03-03".to_string(), 1),
        ]));
        let today = NaiveDate::from_ymd_opt(2024, 3, 3).unwrap();
        let window = record.last_days(3, today);
        assert_eq!(
            window,
            vec![
                ("2024-03-01".to_string(), 2),
                ("2024-03-02".to_string(), 0),
                ("2024-03-03".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_last_days_from_log() {
        let at = |h| Utc.with_ymd_and_hms(2024, 3, 3, h, 0, 0).unwrap();
        let entry = |h, state, counter, delta| HistoryEntry {
            timestamp: at(h),
            state,
            counter,
            transport: "direct".to_string(),
            delta,
        };
        let today = NaiveDate::from_ymd_opt(2024, 3, 3).unwrap();

        let record = HistoryRecord::Log(VecDeque::from(vec![
            entry(1, Health::Down, 4, 1),
            entry(2, Health::Up, 4, 0),
            entry(3, Health::Down, 5, 1),
            entry(4, Health::Down, 6, 1),
        ]));
        assert_eq!(record.last_days(1, today), vec![("2024-03-03".to_string(), 3)]);
    }

    #[test]
    fn test_last_days_counts_first_log_entry() {
        let record = HistoryRecord::Log(VecDeque::from(vec![HistoryEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 3, 8, 0, 0).unwrap(),
            state: Health::Down,
            counter: 1,
            transport: "direct".to_string(),
            delta: 1,
        }]));
        let today = NaiveDate::from_ymd_opt(2024, 3, 3).unwrap();
        assert_eq!(record.last_days(1, today), vec![("2024-03-03".to_string(), 1)]);
    }

    #[test]
    fn test_log_entry_without_delta_reads_zero() {
        let raw = r#"[{"timestamp":"2024-03-03T08:00:00Z","state":"up","counter":2,"transport":"direct"}]"#;
        let HistoryRecord::Log(entries) = serde_json::from_str(raw).unwrap() else {
            panic!("expected log record");
        };
        assert_eq!(entries[0].delta, 0);
    }
}
