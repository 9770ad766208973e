//! Signal detectors. Each one polls a leaf collaborator, passes the
//! candidate through its own [`CooldownGate`](super::cooldown::CooldownGate)
//! and, on a fresh signal, hands a [`Fire`] to the [`Dispatcher`].
//!
//! Collaborator failures stop at this boundary: they are logged and the
//! detector reports "no signal" for that tick.

use std::sync::Arc;

use chrono::{DateTime, Local};

use crate::models::{Activity, ActivityDetails, ActivityKind};
use crate::sensors::SensorError;

use super::activity_store::ActivityStore;

pub mod client;
pub mod crm;
pub mod phone;
pub mod process;
pub mod website;

pub use client::ClientDetector;
pub use crm::CrmDetector;
pub use phone::PhoneDetector;
pub use process::ProcessDetector;
pub use website::WebsiteDetector;

const MAX_LABEL_CHARS: usize = 50;

/// A signal that passed its gate: the record to store and the label for
/// the clip it triggers.
#[derive(Debug, Clone, PartialEq)]
pub struct Fire {
    pub details: ActivityDetails,
    pub label: String,
}

pub trait Detector: Send {
    fn kind(&self) -> ActivityKind;

    fn probe(&mut self, now: DateTime<Local>) -> Result<Option<Fire>, SensorError>;

    fn evaluate(&mut self, now: DateTime<Local>) -> Option<Fire> {
        match self.probe(now) {
            Ok(fire) => fire,
            Err(e) => {
                log::debug!("[{}] No signal this tick: {}", self.kind(), e);
                None
            }
        }
    }
}

/// Receiver of recording requests. Returns `false` when the request was
/// dropped because a session is already running.
pub trait RecordingTrigger: Send + Sync {
    fn request_recording(&self, event_type: &str, label: &str) -> bool;
}

#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<ActivityStore>,
    recorder: Arc<dyn RecordingTrigger>,
}

impl Dispatcher {
    pub fn new(store: Arc<ActivityStore>, recorder: Arc<dyn RecordingTrigger>) -> Self {
        Self { store, recorder }
    }

    pub fn dispatch(&self, fire: Fire, now: DateTime<Local>) -> Activity {
        let activity = Activity::new(now, fire.details);
        let kind = activity.kind();
        log::info!("[{}] {} at {}", kind, fire.label, now.format("%H:%M:%S"));

        if let Err(e) = self.store.record(activity.clone()) {
            log::error!("[Store] Failed to persist {}: {}", kind, e);
        }
        if !self.recorder.request_recording(kind.event_type(), &fire.label) {
            log::debug!("[{}] Recording already active, request dropped", kind);
        }
        activity
    }
}

/// The window-based detectors ticked together by the detection worker.
pub struct DetectorSet {
    detectors: Vec<Box<dyn Detector>>,
    dispatcher: Dispatcher,
}

impl DetectorSet {
    pub fn new(detectors: Vec<Box<dyn Detector>>, dispatcher: Dispatcher) -> Self {
        Self {
            detectors,
            dispatcher,
        }
    }

    pub fn tick(&mut self, now: DateTime<Local>) -> Vec<Activity> {
        let mut fired = Vec::new();
        for detector in &mut self.detectors {
            if let Some(fire) = detector.evaluate(now) {
                fired.push(self.dispatcher.dispatch(fire, now));
            }
        }
        fired
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }
}

/// Makes a window title or site name safe for logs and clip labels.
pub fn sanitize_label(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_LABEL_CHARS)
        .collect()
}

pub(crate) fn find_keyword<'a>(haystack: &str, keywords: &'a [String]) -> Option<&'a str> {
    keywords
        .iter()
        .map(String::as_str)
        .find(|keyword| !keyword.is_empty() && haystack.contains(keyword))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;
    use crate::models::WindowInfo;
    use crate::sensors::WindowInspector;

    /// Inspector whose answers are swapped between ticks.
    #[derive(Default)]
    pub struct FakeInspector {
        pub active: Mutex<Option<WindowInfo>>,
        pub visible: Mutex<Vec<WindowInfo>>,
        pub fail: Mutex<bool>,
        /// Number of upcoming `visible_windows` calls that panic.
        pub panics: Mutex<u32>,
    }

    impl FakeInspector {
        pub fn focus(&self, window: WindowInfo) {
            *self.active.lock().unwrap() = Some(window.clone());
            *self.visible.lock().unwrap() = vec![window];
        }

        pub fn set_failing(&self, failing: bool) {
            *self.fail.lock().unwrap() = failing;
        }
    }

    impl WindowInspector for FakeInspector {
        fn active_window(&self) -> Result<Option<WindowInfo>, SensorError> {
            if *self.fail.lock().unwrap() {
                return Err(SensorError::Window("display server gone".to_string()));
            }
            Ok(self.active.lock().unwrap().clone())
        }

        fn visible_windows(&self) -> Result<Vec<WindowInfo>, SensorError> {
            let crash = {
                let mut panics = self.panics.lock().unwrap();
                let crash = *panics > 0;
                *panics = panics.saturating_sub(1);
                crash
            };
            if crash {
                panic!("window list crashed");
            }
            if *self.fail.lock().unwrap() {
                return Err(SensorError::Window("display server gone".to_string()));
            }
            Ok(self.visible.lock().unwrap().clone())
        }
    }

    #[derive(Default)]
    pub struct CountingTrigger {
        pub requests: Mutex<Vec<(String, String)>>,
    }

    impl RecordingTrigger for CountingTrigger {
        fn request_recording(&self, event_type: &str, label: &str) -> bool {
            let mut requests = self.requests.lock().unwrap();
            requests.push((event_type.to_string(), label.to_string()));
            requests.len() == 1
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone};

    use super::testing::{CountingTrigger, FakeInspector};
    use super::*;
    use crate::models::WindowInfo;

    fn t(secs: i64) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn sanitize_label_replaces_reserved_characters() {
        assert_eq!(sanitize_label("a/b:c*d?"), "a_b_c_d_");
        assert_eq!(sanitize_label(&"x".repeat(80)).len(), 50);
    }

    #[test]
    fn tick_stores_and_requests_recording_per_fire() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ActivityStore::new(dir.path()));
        let trigger = Arc::new(CountingTrigger::default());
        let inspector = Arc::new(FakeInspector::default());
        inspector.focus(WindowInfo::titled("Contacts | Bitrix24 CRM - Google Chrome"));

        let keywords = vec!["crm".to_string(), "bitrix".to_string()];
        let mut set = DetectorSet::new(
            vec![
                Box::new(CrmDetector::new(inspector.clone(), keywords)),
                Box::new(WebsiteDetector::new(inspector.clone())),
            ],
            Dispatcher::new(store.clone(), trigger.clone()),
        );

        let fired = set.tick(t(0));
        assert_eq!(fired.len(), 2);
        assert_eq!(fired[0].kind(), ActivityKind::CrmAccess);
        assert_eq!(fired[1].kind(), ActivityKind::WebsiteVisit);

        let requests = trigger.requests.lock().unwrap().clone();
        assert_eq!(requests[0].0, "CRM");
        assert_eq!(requests[1].0, "WEBSITE");
        assert_eq!(store.recent_activities(50).len(), 2);

        assert!(set.tick(t(1)).is_empty());
    }

    #[test]
    fn collaborator_failure_is_no_signal() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ActivityStore::new(dir.path()));
        let inspector = Arc::new(FakeInspector::default());
        inspector.focus(WindowInfo::titled("CRM"));
        inspector.set_failing(true);

        let mut set = DetectorSet::new(
            vec![Box::new(CrmDetector::new(inspector.clone(), vec!["crm".to_string()]))],
            Dispatcher::new(store.clone(), Arc::new(CountingTrigger::default())),
        );

        assert!(set.tick(t(0)).is_empty());
        inspector.set_failing(false);
        assert_eq!(set.tick(t(1)).len(), 1);
    }
}
