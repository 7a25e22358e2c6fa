//! HTTP request handlers.

use super::AppState;
use crate::db::{DiagnosticSnapshot, Health, ObserverState, Report};
use crate::scheduler::{CycleError, ProbeSettings};

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

impl IntoResponse for CycleError {
    fn into_response(self) -> Response {
        let status = match &self {
            CycleError::Busy => StatusCode::CONFLICT,
            CycleError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            CycleError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

// ============================================================================
// Status & export
// ============================================================================

pub async fn handle_status(State(state): State<AppState>) -> impl IntoResponse {
    match state.observer.report() {
        Ok(report) => Json(report).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn handle_export(State(state): State<AppState>) -> impl IntoResponse {
    match state.observer.report() {
        Ok(report) => {
            let disposition = format!(
                "attachment; filename=\"downtally-{}.json\"",
                report.exported_at.format("%Y%m%d-%H%M%S")
            );
            ([(header::CONTENT_DISPOSITION, disposition)], Json(report)).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn handle_import(
    State(state): State<AppState>,
    Json(report): Json<Report>,
) -> impl IntoResponse {
    match state.observer.import(&report).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct DayCount {
    pub day: String,
    pub count: u64,
}

pub async fn handle_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let days = query.days.unwrap_or(7).clamp(1, 366);

    match state.observer.report() {
        Ok(report) => {
            let window: Vec<DayCount> = report
                .history
                .last_days(days, Utc::now().date_naive())
                .into_iter()
                .map(|(day, count)| DayCount { day, count })
                .collect();
            Json(window).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

// ============================================================================
// Actions
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub state: Health,
    pub reason: String,
    pub counted: bool,
    pub total: u64,
    pub diagnostics: DiagnosticSnapshot,
}

pub async fn handle_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.observer.run_cycle().await {
        Ok(outcome) => Json(CheckResponse {
            state: outcome.classification.state,
            reason: outcome.classification.reason,
            counted: outcome.counted,
            total: outcome.state.down_counter,
            diagnostics: outcome.snapshot,
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn handle_increment(State(state): State<AppState>) -> impl IntoResponse {
    match state.observer.force_increment().await {
        Ok(observer_state) => Json::<ObserverState>(observer_state).into_response(),
        Err(e) => e.into_response(),
    }
}

// ============================================================================
// Configuration
// ============================================================================

pub async fn handle_get_config(State(state): State<AppState>) -> impl IntoResponse {
    match state.observer.settings() {
        Ok(settings) => Json(settings).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn handle_update_config(
    State(state): State<AppState>,
    Json(req): Json<ProbeSettings>,
) -> impl IntoResponse {
    if let Err(e) = state.observer.update_settings(&req) {
        return e.into_response();
    }

    // Echo the stored, normalized settings.
    match state.observer.settings() {
        Ok(settings) => Json(settings).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
