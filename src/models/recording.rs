use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::sensing::CaptureRegion;

/// One entry of the encoder fallback chain: a codec tag plus the container
/// extension the clip is written with when this entry wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderCandidate {
    pub codec: String,
    pub extension: String,
}

impl EncoderCandidate {
    pub fn new(codec: &str, extension: &str) -> Self {
        Self {
            codec: codec.to_string(),
            extension: extension.to_string(),
        }
    }

    /// mp4 codecs first, then the avi container, then animated GIF which
    /// needs no external encoder at all.
    pub fn defaults() -> Vec<EncoderCandidate> {
        vec![
            EncoderCandidate::new("mp4v", "mp4"),
            EncoderCandidate::new("avc1", "mp4"),
            EncoderCandidate::new("XVID", "avi"),
            EncoderCandidate::new("MJPG", "avi"),
            EncoderCandidate::new("GIF", "gif"),
        ]
    }
}

impl std::fmt::Display for EncoderCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/.{}", self.codec, self.extension)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecorderState {
    Idle,
    Starting,
    Capturing,
    Finalizing,
}

impl Default for RecorderState {
    fn default() -> Self {
        RecorderState::Idle
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSession {
    pub event_type: String,
    pub label: String,
    pub started_at: DateTime<Local>,
    pub duration_budget_secs: f64,
    pub file_path: PathBuf,
    pub geometry: CaptureRegion,
    pub encoder: EncoderCandidate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStatus {
    pub is_recording: bool,
    pub event_type: Option<String>,
    pub state: RecorderState,
    pub session: Option<RecordingSession>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub filename: String,
    pub size_mb: f64,
    pub created: String,
    pub format: String,
}
