use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityKind {
    CrmAccess,
    PhoneUsage,
    ClientInteraction,
    WebsiteVisit,
    ProcessActivity,
}

impl ActivityKind {
    /// Event type used for recordings and clip file names.
    pub fn event_type(&self) -> &'static str {
        match self {
            ActivityKind::CrmAccess => "CRM",
            ActivityKind::PhoneUsage => "PHONE",
            ActivityKind::ClientInteraction => "CLIENT",
            ActivityKind::WebsiteVisit => "WEBSITE",
            ActivityKind::ProcessActivity => "PROCESS",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::CrmAccess => "CRM_ACCESS",
            ActivityKind::PhoneUsage => "PHONE_USAGE",
            ActivityKind::ClientInteraction => "CLIENT_INTERACTION",
            ActivityKind::WebsiteVisit => "WEBSITE_VISIT",
            ActivityKind::ProcessActivity => "PROCESS_ACTIVITY",
        }
    }
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    Title,
    Ocr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityDetails {
    CrmAccess {
        window_title: String,
        keyword: String,
        count: u64,
    },
    PhoneUsage {
        confidence: f64,
        count: u64,
    },
    ClientInteraction {
        window_title: String,
        keyword: String,
        detection_method: DetectionMethod,
        count: u64,
    },
    WebsiteVisit {
        site_name: String,
        window_title: String,
        visit_count: u64,
    },
    ProcessActivity {
        process_name: String,
        window_title: String,
        process_path: String,
        count: u64,
    },
}

impl ActivityDetails {
    pub fn kind(&self) -> ActivityKind {
        match self {
            ActivityDetails::CrmAccess { .. } => ActivityKind::CrmAccess,
            ActivityDetails::PhoneUsage { .. } => ActivityKind::PhoneUsage,
            ActivityDetails::ClientInteraction { .. } => ActivityKind::ClientInteraction,
            ActivityDetails::WebsiteVisit { .. } => ActivityKind::WebsiteVisit,
            ActivityDetails::ProcessActivity { .. } => ActivityKind::ProcessActivity,
        }
    }
}

/// One detection event. Built once by the detector that fired and never
/// mutated afterwards; the daily log and the API both see the same value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(flatten)]
    details: ActivityDetails,
    #[serde(with = "timestamp_format")]
    timestamp: NaiveDateTime,
}

impl Activity {
    pub fn new(timestamp: DateTime<Local>, details: ActivityDetails) -> Self {
        Self {
            details,
            // Second precision, same as the on-disk format.
            timestamp: truncate_to_seconds(timestamp.naive_local()),
        }
    }

    pub fn kind(&self) -> ActivityKind {
        self.details.kind()
    }

    pub fn details(&self) -> &ActivityDetails {
        &self.details
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    /// Calendar day the activity belongs to (selects the daily log file).
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

fn truncate_to_seconds(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_nanosecond(0).unwrap_or(ts)
}

mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}
