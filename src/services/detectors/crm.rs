use std::sync::Arc;

use chrono::{DateTime, Duration, Local};

use super::{find_keyword, sanitize_label, Detector, Fire};
use crate::models::{ActivityDetails, ActivityKind};
use crate::sensors::{SensorError, WindowInspector};
use crate::services::cooldown::CooldownGate;

const CRM_COOLDOWN_SECS: i64 = 5;

/// Fires when any visible window title carries a configured CRM keyword.
pub struct CrmDetector {
    inspector: Arc<dyn WindowInspector>,
    keywords: Vec<String>,
    gate: CooldownGate,
    count: u64,
}

impl CrmDetector {
    pub fn new(inspector: Arc<dyn WindowInspector>, keywords: Vec<String>) -> Self {
        let keywords = keywords
            .into_iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        Self {
            inspector,
            keywords,
            gate: CooldownGate::global(Duration::seconds(CRM_COOLDOWN_SECS)),
            count: 0,
        }
    }
}

impl Detector for CrmDetector {
    fn kind(&self) -> ActivityKind {
        ActivityKind::CrmAccess
    }

    fn probe(&mut self, now: DateTime<Local>) -> Result<Option<Fire>, SensorError> {
        let windows = self.inspector.visible_windows()?;

        let matched = windows.into_iter().filter(|w| w.visible).find_map(|window| {
            let title = window.title.to_lowercase();
            find_keyword(&title, &self.keywords).map(|keyword| (window, keyword.to_string()))
        });

        let Some((window, keyword)) = matched else {
            return Ok(None);
        };
        if !self.gate.should_fire("", now) {
            return Ok(None);
        }

        self.count += 1;
        Ok(Some(Fire {
            label: sanitize_label(&window.title),
            details: ActivityDetails::CrmAccess {
                window_title: window.title,
                keyword,
                count: self.count,
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::models::WindowInfo;
    use crate::services::activity_store::ActivityStore;
    use crate::services::detectors::testing::{CountingTrigger, FakeInspector};
    use crate::services::detectors::{DetectorSet, Dispatcher};

    fn t(secs: i64) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 4, 2, 14, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn keywords() -> Vec<String> {
        vec!["CRM".to_string(), " hubspot ".to_string(), String::new()]
    }

    #[test]
    fn repeated_title_within_cooldown_records_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ActivityStore::new(dir.path()));
        let inspector = Arc::new(FakeInspector::default());
        inspector.focus(WindowInfo::titled("MyCRM \u{2014} client"));

        let mut set = DetectorSet::new(
            vec![Box::new(CrmDetector::new(inspector.clone(), keywords()))],
            Dispatcher::new(store.clone(), Arc::new(CountingTrigger::default())),
        );

        set.tick(t(0));
        set.tick(t(2));
        set.tick(t(4));

        assert_eq!(store.recent_activities(10).len(), 1);
        assert_eq!(store.counters().get(ActivityKind::CrmAccess), 1);
    }

    #[test]
    fn fires_again_after_cooldown_with_running_count() {
        let inspector = Arc::new(FakeInspector::default());
        inspector.focus(WindowInfo::titled("Deals - HubSpot"));
        let mut detector = CrmDetector::new(inspector, keywords());

        let first = detector.evaluate(t(0)).unwrap();
        assert!(detector.evaluate(t(5)).is_none());
        let second = detector.evaluate(t(6)).unwrap();

        assert_eq!(
            first.details,
            ActivityDetails::CrmAccess {
                window_title: "Deals - HubSpot".to_string(),
                keyword: "hubspot".to_string(),
                count: 1,
            }
        );
        assert!(matches!(second.details, ActivityDetails::CrmAccess { count: 2, .. }));
    }

    #[test]
    fn hidden_windows_are_ignored() {
        let inspector = Arc::new(FakeInspector::default());
        let mut hidden = WindowInfo::titled("crm backoffice");
        hidden.visible = false;
        inspector.focus(hidden);

        let mut detector = CrmDetector::new(inspector, keywords());
        assert!(detector.evaluate(t(0)).is_none());
    }
}
