//! Scheduler module: periodic probe cycles and the state they maintain.

mod context;
mod history;
mod tracker;

pub use context::*;
pub use history::*;

use crate::probe::Fetcher;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};

/// Drives probe cycles on a fixed interval.
pub struct Scheduler<F> {
    context: Arc<ObserverContext<F>>,
    interval: Duration,
    stop: Mutex<Option<broadcast::Sender<()>>>,
}

impl<F: Fetcher + 'static> Scheduler<F> {
    pub fn new(context: Arc<ObserverContext<F>>, interval: Duration) -> Self {
        Self {
            context,
            interval,
            stop: Mutex::new(None),
        }
    }

    /// Start polling in a background task. Calling it twice is a no-op.
    pub async fn start(&self) {
        let mut stop = self.stop.lock().await;
        if stop.is_some() {
            return;
        }

        let (tx, rx) = broadcast::channel(1);
        *stop = Some(tx);

        tracing::info!("Scheduler: polling every {:?}", self.interval);
        tokio::spawn(run_probe_loop(self.context.clone(), self.interval, rx));
    }

    /// Stop the polling task.
    pub async fn stop(&self) {
        if let Some(tx) = self.stop.lock().await.take() {
            let _ = tx.send(());
            tracing::info!("Scheduler: stopped");
        }
    }
}

async fn run_probe_loop<F: Fetcher>(
    context: Arc<ObserverContext<F>>,
    interval: Duration,
    mut stop_rx: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = ticker.tick() => {
                // Add jitter to avoid probing on exact interval boundaries
                let jitter = rand::random::<u64>() % 250;
                tokio::time::sleep(Duration::from_millis(jitter)).await;

                match context.run_cycle().await {
                    Ok(_) => {}
                    Err(CycleError::Busy) => {
                        tracing::warn!("Scheduler: skipping tick, previous cycle still running");
                    }
                    Err(e) => tracing::error!("Scheduler: probe cycle failed: {}", e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Health, HistoryMode, KeyValueStore, MemoryStore};
    use crate::probe::testing::{Reply, ScriptedFetcher};
    use crate::probe::{RawResponse, DEFAULT_DETECTION_PHRASE};

    #[tokio::test]
    async fn test_scheduler_runs_and_stops() {
        let target = "https://status.example.com/";
        let store = Arc::new(MemoryStore::new());
        let context = Arc::new(ObserverContext::new(
            store.clone(),
            ScriptedFetcher::new().on(target, Reply::Respond(RawResponse::new(500, ""))),
            HistoryAggregator::new(HistoryMode::Daily),
            ProbeSettings {
                target_url: target.to_string(),
                detection_phrase: DEFAULT_DETECTION_PHRASE.to_string(),
                relay_override: String::new(),
            },
            Duration::from_millis(50),
        ));

        let scheduler = Scheduler::new(context.clone(), Duration::from_millis(20));
        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(600)).await;
        scheduler.stop().await;

        let state = context.state().unwrap();
        assert_eq!(state.last_state, Health::Down);
        // Many ticks, one outage.
        assert_eq!(state.down_counter, 1);
        assert!(store.read_string(crate::db::keys::DIAGNOSTICS).unwrap().is_some());
    }
}
