use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Local};

use super::{sanitize_label, Detector, Fire};
use crate::models::{ActivityDetails, ActivityKind};
use crate::sensors::{SensorError, WindowInspector};
use crate::services::cooldown::CooldownGate;

const WEBSITE_COOLDOWN_SECS: i64 = 5;

pub const BROWSER_MARKERS: &[&str] = &["chrome", "firefox", "edge", "opera", "safari", "brave", "yandex"];

const SITE_SEPARATORS: &[&str] = &[" - ", " | ", " \u{2014} "];

/// Site name is the title text before the first separator the browser
/// put between page and application name.
pub fn site_name(title: &str) -> String {
    SITE_SEPARATORS
        .iter()
        .find_map(|sep| title.split_once(sep).map(|(head, _)| head))
        .unwrap_or(title)
        .trim()
        .to_string()
}

pub fn is_browser_title(title: &str) -> bool {
    let title = title.to_lowercase();
    BROWSER_MARKERS.iter().any(|browser| title.contains(browser))
}

pub struct WebsiteDetector {
    inspector: Arc<dyn WindowInspector>,
    gate: CooldownGate,
    visits: HashMap<String, u64>,
}

impl WebsiteDetector {
    pub fn new(inspector: Arc<dyn WindowInspector>) -> Self {
        Self {
            inspector,
            gate: CooldownGate::keyed(Duration::seconds(WEBSITE_COOLDOWN_SECS)),
            visits: HashMap::new(),
        }
    }

    pub fn visit_count(&self, site: &str) -> u64 {
        self.visits.get(site).copied().unwrap_or(0)
    }
}

impl Detector for WebsiteDetector {
    fn kind(&self) -> ActivityKind {
        ActivityKind::WebsiteVisit
    }

    fn probe(&mut self, now: DateTime<Local>) -> Result<Option<Fire>, SensorError> {
        let Some(window) = self.inspector.active_window()? else {
            return Ok(None);
        };
        if !window.visible || !is_browser_title(&window.title) {
            return Ok(None);
        }

        let site = site_name(&window.title);
        if site.is_empty() || !self.gate.should_fire(&site, now) {
            return Ok(None);
        }

        let visit_count = {
            let count = self.visits.entry(site.clone()).or_insert(0);
            *count += 1;
            *count
        };

        Ok(Some(Fire {
            label: sanitize_label(&site),
            details: ActivityDetails::WebsiteVisit {
                site_name: site,
                window_title: window.title,
                visit_count,
            },
        }))
    }
}
