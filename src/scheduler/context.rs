//! The observer context: everything one probe cycle needs, passed explicitly.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::db::{
    keys, AttemptRecord, DbError, DiagnosticSnapshot, Health, HistoryRecord, KeyValueStore,
    ObserverState, Report,
};
use crate::probe::{
    classify, is_valid_target, truncate_bytes, Classification, Fetcher, ProbeResult, Resolver,
    TransportPolicy,
};

use super::history::{HistoryAggregator, Observation, MANUAL};
use super::tracker::{apply_classification, load_state, state_entries};

/// Reason attached to cycles short-circuited by a malformed target.
pub const INVALID_URL: &str = "invalid-url";

const SNIPPET_BYTES: usize = 300;

#[derive(Error, Debug)]
pub enum CycleError {
    #[error("a probe cycle is already in flight")]
    Busy,
    #[error("invalid target url: {0}")]
    InvalidTarget(String),
    #[error(transparent)]
    Store(#[from] DbError),
}

/// User-facing probe configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSettings {
    pub target_url: String,
    pub detection_phrase: String,
    #[serde(default)]
    pub relay_override: String,
}

/// What one completed cycle produced.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub classification: Classification,
    pub counted: bool,
    pub state: ObserverState,
    pub snapshot: DiagnosticSnapshot,
}

pub struct ObserverContext<F> {
    store: Arc<dyn KeyValueStore>,
    resolver: Resolver<F>,
    aggregator: HistoryAggregator,
    defaults: ProbeSettings,
    timeout: Duration,
    cycle_guard: Mutex<()>,
}

impl<F: Fetcher> ObserverContext<F> {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        fetcher: F,
        aggregator: HistoryAggregator,
        defaults: ProbeSettings,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            resolver: Resolver::new(fetcher),
            aggregator,
            defaults,
            timeout,
            cycle_guard: Mutex::new(()),
        }
    }

    /// Effective settings: stored overrides on top of process defaults.
    pub fn settings(&self) -> Result<ProbeSettings, DbError> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        Ok(ProbeSettings {
            target_url: non_empty(self.store.read_string(keys::TARGET_URL)?)
                .unwrap_or_else(|| self.defaults.target_url.clone()),
            detection_phrase: non_empty(self.store.read_string(keys::DETECTION_PHRASE)?)
                .unwrap_or_else(|| self.defaults.detection_phrase.clone()),
            // An explicitly stored empty relay disables the default one.
            relay_override: self
                .store
                .read_string(keys::RELAY_OVERRIDE)?
                .unwrap_or_else(|| self.defaults.relay_override.clone()),
        })
    }

    pub fn update_settings(&self, settings: &ProbeSettings) -> Result<(), CycleError> {
        if !is_valid_target(&settings.target_url) {
            return Err(CycleError::InvalidTarget(settings.target_url.clone()));
        }
        self.store.save_string(keys::TARGET_URL, settings.target_url.trim())?;
        self.store.save_string(keys::DETECTION_PHRASE, &settings.detection_phrase)?;
        self.store.save_string(keys::RELAY_OVERRIDE, settings.relay_override.trim())?;
        tracing::info!("Settings updated, target is now {}", settings.target_url.trim());
        Ok(())
    }

    pub fn state(&self) -> Result<ObserverState, DbError> {
        load_state(self.store.as_ref())
    }

    pub fn diagnostics(&self) -> Result<Option<DiagnosticSnapshot>, DbError> {
        Ok(self
            .store
            .read_string(keys::DIAGNOSTICS)?
            .and_then(|raw| serde_json::from_str(&raw).ok()))
    }

    /// Run one probe cycle, rejecting the trigger if another is in flight.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, CycleError> {
        let _guard = self.cycle_guard.try_lock().map_err(|_| CycleError::Busy)?;
        self.run_cycle_locked(Utc::now()).await
    }

    async fn run_cycle_locked(&self, now: DateTime<Utc>) -> Result<CycleOutcome, CycleError> {
        let settings = self.settings()?;
        let target = settings.target_url.trim().to_string();

        if !is_valid_target(&target) {
            tracing::warn!("Skipping probe: invalid target url {:?}", target);
            let classification = Classification::new(Health::Unknown, INVALID_URL);
            let failed = ProbeResult::failed(INVALID_URL);
            let snapshot = build_snapshot(now, &target, Vec::new(), &failed, &classification);
            self.save_snapshot(&snapshot)?;
            return Ok(CycleOutcome {
                classification,
                counted: false,
                state: self.state()?,
                snapshot,
            });
        }

        let relay = settings.relay_override.trim();
        let policy = TransportPolicy::standard(Some(relay), self.timeout);
        tracing::debug!(
            "Probing {} over {} transports (worst case {:?})",
            target,
            policy.transports.len(),
            policy.worst_case()
        );
        let resolution = self.resolver.resolve(&target, &policy).await;
        let classification = classify(&resolution.result, &settings.detection_phrase);

        let mut state = self.state()?;
        let transition = apply_classification(state.last_state, &classification);
        if transition.counted {
            state.down_counter += 1;
        }
        state.last_state = transition.state;
        state.last_checked = Some(format_checked(now));

        self.aggregator.record(
            self.store.as_ref(),
            &Observation {
                timestamp: now,
                state: transition.state,
                counter: state.down_counter,
                transport: resolution.transport.clone(),
                delta: transition.counted as u64,
            },
            &state,
        )?;

        let snapshot = build_snapshot(now, &target, resolution.trail, &resolution.result, &classification);
        self.save_snapshot(&snapshot)?;

        tracing::info!(
            "Probe via {}: {} ({}), down count {}{}",
            resolution.transport,
            classification.state,
            classification.reason,
            state.down_counter,
            if transition.counted { " (+1)" } else { "" }
        );

        Ok(CycleOutcome {
            classification,
            counted: transition.counted,
            state,
            snapshot,
        })
    }

    /// Count one outage by hand. Waits for any in-flight cycle to finish.
    pub async fn force_increment(&self) -> Result<ObserverState, CycleError> {
        let _guard = self.cycle_guard.lock().await;

        let now = Utc::now();
        let mut state = self.state()?;
        state.down_counter += 1;

        self.aggregator.record(
            self.store.as_ref(),
            &Observation {
                timestamp: now,
                state: Health::Down,
                counter: state.down_counter,
                transport: MANUAL.to_string(),
                delta: 1,
            },
            &state,
        )?;

        tracing::info!("Manual increment, down count {}", state.down_counter);
        Ok(state)
    }

    pub fn report(&self) -> Result<Report, DbError> {
        let state = self.state()?;
        Ok(Report {
            total: state.down_counter,
            last_state: state.last_state,
            last_checked: state.last_checked,
            history: self.store.read_history(self.aggregator.mode())?,
            diagnostics: self.diagnostics()?,
            exported_at: Utc::now(),
        })
    }

    /// Replace counter, state and history with those of an exported report.
    pub async fn import(&self, report: &Report) -> Result<(), CycleError> {
        let _guard = self.cycle_guard.lock().await;

        let state = ObserverState {
            last_state: report.last_state,
            down_counter: report.total,
            last_checked: report.last_checked.clone(),
        };

        let mut history = if report.history.matches(self.aggregator.mode()) {
            report.history.clone()
        } else {
            tracing::warn!("Imported history has a different retention mode, clearing it");
            HistoryRecord::empty(self.aggregator.mode())
        };
        self.aggregator.enforce_cap(&mut history);

        let mut entries = vec![(keys::HISTORY, serde_json::to_string(&history).map_err(DbError::from)?)];
        entries.extend(state_entries(&state));
        self.store.save_batch(&entries)?;

        if let Some(diagnostics) = &report.diagnostics {
            self.save_snapshot(diagnostics)?;
        }

        tracing::info!("Imported report with down count {}", report.total);
        Ok(())
    }

    fn save_snapshot(&self, snapshot: &DiagnosticSnapshot) -> Result<(), DbError> {
        let raw = serde_json::to_string(snapshot)?;
        self.store.save_string(keys::DIAGNOSTICS, &raw)
    }
}

fn build_snapshot(
    now: DateTime<Utc>,
    target: &str,
    attempts: Vec<AttemptRecord>,
    result: &ProbeResult,
    classification: &Classification,
) -> DiagnosticSnapshot {
    DiagnosticSnapshot {
        probed_at: now,
        target: target.to_string(),
        attempts,
        final_status: result.status_label(),
        final_ok: result.succeeded,
        state: classification.state,
        reason: classification.reason.clone(),
        body_snippet: truncate_bytes(&result.body, SNIPPET_BYTES).to_string(),
    }
}

fn format_checked(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
