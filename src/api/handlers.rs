use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::Local;
use serde::Serialize;

use super::error::{ApiError, Result};
use super::ApiState;
use crate::models::{Activity, MonitorStats, UsageSession};
use crate::services::activity_store::DailySummary;

const RECENT_LIMIT: usize = 50;

#[derive(Debug, Serialize)]
pub struct WebsitesResponse {
    pub visits: Vec<Activity>,
    pub counts: BTreeMap<String, u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageResponse {
    pub sessions: Vec<UsageSession>,
    pub active: bool,
    pub total_computer_time_hours: f64,
}

pub async fn get_stats(State(state): State<Arc<ApiState>>) -> Json<MonitorStats> {
    Json(state.monitor.stats(Local::now()))
}

pub async fn get_websites(State(state): State<Arc<ApiState>>) -> Json<WebsitesResponse> {
    let store = &state.monitor.store;
    Json(WebsitesResponse {
        visits: store.recent_website_visits(RECENT_LIMIT),
        counts: store.counters().websites,
    })
}

/// Last 50 activities, most recent last.
pub async fn get_activities(State(state): State<Arc<ApiState>>) -> Json<Vec<Activity>> {
    Json(state.monitor.store.recent_activities(RECENT_LIMIT))
}

/// Per-day totals across every daily log on disk, newest day first.
pub async fn get_daily(State(state): State<Arc<ApiState>>) -> Result<Json<Vec<DailySummary>>> {
    let store = state.monitor.store.clone();
    let summaries = tokio::task::spawn_blocking(move || store.daily_summaries())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(summaries))
}

pub async fn get_usage(State(state): State<Arc<ApiState>>) -> Json<UsageResponse> {
    let now = Local::now();
    let usage = match state.monitor.usage.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    Json(UsageResponse {
        sessions: usage.sessions().to_vec(),
        active: usage.is_active(),
        total_computer_time_hours: MonitorStats::hours(usage.total_active_seconds(now)),
    })
}
