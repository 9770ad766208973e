use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::recording::EncoderCandidate;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Camera stream address (RTSP/HTTP/device). `None` disables vision capture.
    pub camera_url: Option<String>,
    /// Object-detection endpoint the camera frames are posted to.
    pub classifier_url: Option<String>,
    pub crm_keywords: Vec<String>,
    pub output_dir: PathBuf,
    pub host: String,
    pub web_port: u16,
    pub tracking: TrackingSettings,
    pub recording: RecordingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            camera_url: None,
            classifier_url: None,
            crm_keywords: default_crm_keywords(),
            output_dir: PathBuf::from("activity_logs"),
            host: "0.0.0.0".to_string(),
            web_port: 5000,
            tracking: TrackingSettings::default(),
            recording: RecordingSettings::default(),
        }
    }
}

impl Settings {
    pub fn videos_dir(&self) -> PathBuf {
        self.output_dir.join("videos")
    }
}

fn default_crm_keywords() -> Vec<String> {
    ["crm", "client", "mijoz", "customer", "salesforce", "hubspot", "bitrix"]
        .iter()
        .map(|k| k.to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingSettings {
    pub detection_interval_ms: u64,
    pub vision_interval_ms: u64,
    pub ocr_enabled: bool,
    pub ocr_languages: String,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            detection_interval_ms: 2000,
            vision_interval_ms: 500,
            ocr_enabled: true,
            ocr_languages: "eng".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    pub duration_secs: u64,
    pub fps: u32,
    pub buffer_frames: usize,
    pub encoders: Vec<EncoderCandidate>,
    pub ffmpeg_path: String,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            duration_secs: 30,
            fps: 10,
            buffer_frames: 300,
            encoders: EncoderCandidate::defaults(),
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}
