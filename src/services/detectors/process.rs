use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Local};

use super::{sanitize_label, Detector, Fire};
use crate::models::{ActivityDetails, ActivityKind, WindowInfo};
use crate::sensors::{SensorError, WindowInspector};
use crate::services::cooldown::CooldownGate;

pub const KNOWN_BROWSER_EXES: &[&str] = &[
    "chrome.exe",
    "firefox.exe",
    "msedge.exe",
    "opera.exe",
    "safari.exe",
    "brave.exe",
    "yandex.exe",
];

const UNKNOWN_PROCESS: &str = "unknown";

fn is_known_browser(exe: &str) -> bool {
    let exe = exe.to_lowercase();
    KNOWN_BROWSER_EXES
        .iter()
        .any(|known| exe == *known || known.strip_suffix(".exe") == Some(exe.as_str()))
}

/// Process name guessed from the window: the last " - " segment of the
/// title, replaced by the executable name when that is a known browser.
pub fn process_name(window: &WindowInfo) -> String {
    let from_title = window
        .title
        .rsplit_once(" - ")
        .map_or(window.title.as_str(), |(_, app)| app)
        .trim()
        .to_lowercase();

    if let Some(exe) = window.process_name.as_deref().filter(|exe| is_known_browser(exe)) {
        return exe.to_lowercase();
    }
    if from_title.is_empty() {
        UNKNOWN_PROCESS.to_string()
    } else {
        from_title
    }
}

/// Records every switch of the focused application.
pub struct ProcessDetector {
    inspector: Arc<dyn WindowInspector>,
    gate: CooldownGate,
    counts: HashMap<String, u64>,
}

impl ProcessDetector {
    pub fn new(inspector: Arc<dyn WindowInspector>) -> Self {
        Self {
            inspector,
            gate: CooldownGate::on_change(),
            counts: HashMap::new(),
        }
    }
}

impl Detector for ProcessDetector {
    fn kind(&self) -> ActivityKind {
        ActivityKind::ProcessActivity
    }

    fn probe(&mut self, now: DateTime<Local>) -> Result<Option<Fire>, SensorError> {
        let Some(window) = self.inspector.active_window()? else {
            return Ok(None);
        };
        if !window.visible {
            return Ok(None);
        }

        let name = process_name(&window);
        if !self.gate.should_fire(&name, now) {
            return Ok(None);
        }

        let count = {
            let count = self.counts.entry(name.clone()).or_insert(0);
            *count += 1;
            *count
        };

        Ok(Some(Fire {
            label: sanitize_label(&name),
            details: ActivityDetails::ProcessActivity {
                process_name: name,
                process_path: window.process_path.unwrap_or_default(),
                window_title: window.title,
                count,
            },
        }))
    }
}
