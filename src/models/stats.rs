use serde::Serialize;

/// Live counters as served by `/api/stats` and logged at shutdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStats {
    pub crm_access_count: u64,
    pub phone_usage_count: u64,
    pub client_interactions_count: u64,
    pub website_visits_count: u64,
    pub process_activity_count: u64,
    pub unique_websites_count: usize,
    pub computer_sessions_count: usize,
    pub total_computer_time_hours: f64,
    pub is_recording: bool,
    pub recording_event_type: Option<String>,
}

impl MonitorStats {
    pub fn hours(seconds: f64) -> f64 {
        (seconds / 3600.0 * 100.0).round() / 100.0
    }
}
