//! Edge-triggered down counting.

use crate::db::{keys, DbError, Health, KeyValueStore, ObserverState};
use crate::probe::Classification;

/// Result of applying one classification to the previous state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub state: Health,
    /// True when this observation starts a new down period.
    pub counted: bool,
}

/// Only an edge into `down` counts; staying down, recovering, or going
/// unknown never touches the counter.
pub fn apply_classification(previous: Health, classification: &Classification) -> Transition {
    Transition {
        state: classification.state,
        counted: classification.state == Health::Down && previous != Health::Down,
    }
}

pub fn load_state(store: &dyn KeyValueStore) -> Result<ObserverState, DbError> {
    let last_state = store
        .read_string(keys::LAST_STATE)?
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();

    Ok(ObserverState {
        last_state,
        down_counter: store.read_number(keys::DOWN_COUNTER, 0)?,
        last_checked: store
            .read_string(keys::LAST_CHECKED)?
            .filter(|s| !s.trim().is_empty()),
    })
}

/// Key/value pairs making up `state`. A missing check time is written empty
/// so it replaces whatever was stored before.
pub fn state_entries(state: &ObserverState) -> Vec<(&'static str, String)> {
    vec![
        (keys::DOWN_COUNTER, state.down_counter.to_string()),
        (keys::LAST_STATE, state.last_state.as_str().to_string()),
        (keys::LAST_CHECKED, state.last_checked.clone().unwrap_or_default()),
    ]
}
