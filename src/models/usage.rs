use chrono::{DateTime, Local};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSession {
    pub start: DateTime<Local>,
    pub end: Option<DateTime<Local>>,
    pub duration_seconds: f64,
}

impl UsageSession {
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }
}
