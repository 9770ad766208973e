use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Local;
use tokio::task::JoinHandle;

use super::detectors::DetectorSet;
use super::usage_tracker::UsageSessionTracker;
use crate::sensors::WindowInspector;

/// Everything one detection cycle touches. Moved into the blocking pool for
/// the tick and handed back afterwards.
pub struct DetectionCycle {
    pub detectors: DetectorSet,
    pub inspector: Arc<dyn WindowInspector>,
    pub usage: Arc<Mutex<UsageSessionTracker>>,
}

impl DetectionCycle {
    pub fn run_once(&mut self) -> usize {
        let now = Local::now();
        let fired = self.detectors.tick(now).len();

        match self.inspector.visible_windows() {
            Ok(windows) => {
                let has_visible = windows.iter().any(|w| w.visible);
                let mut usage = match self.usage.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                usage.tick(has_visible, now);
            }
            Err(e) => log::debug!("[Tracker] Usage tick skipped: {}", e),
        }
        fired
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Spawns the detection loop. It exits at the first iteration boundary
/// after `running` goes false, so shutdown takes at most one `interval`
/// plus the cycle in flight.
pub fn start_tracking(mut cycle: DetectionCycle, running: Arc<AtomicBool>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        log::info!(
            "[Tracker] Detection loop started: {} detectors every {}ms",
            cycle.detectors.len(),
            interval.as_millis()
        );

        while running.load(Ordering::SeqCst) {
            // A panicking sensor costs one cycle; the detectors keep their state.
            let result = tokio::task::spawn_blocking(move || {
                let fired = panic::catch_unwind(AssertUnwindSafe(|| cycle.run_once()));
                (cycle, fired)
            })
            .await;

            match result {
                Ok((returned, fired)) => {
                    match fired {
                        Ok(0) => {}
                        Ok(fired) => log::debug!("[Tracker] {} detector(s) fired this cycle", fired),
                        Err(payload) => log::error!(
                            "[Tracker] Detection cycle panicked: {}",
                            panic_message(payload.as_ref())
                        ),
                    }
                    cycle = returned;
                }
                Err(e) => {
                    log::error!("[Tracker] Detection task failed, loop stopped: {:?}", e);
                    return;
                }
            }

            tokio::time::sleep(interval).await;
        }

        log::info!("[Tracker] Detection loop stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityKind, WindowInfo};
    use crate::services::activity_store::ActivityStore;
    use crate::services::detectors::testing::{CountingTrigger, FakeInspector};
    use crate::services::detectors::{CrmDetector, Dispatcher, ProcessDetector};

    fn crm_cycle(inspector: Arc<FakeInspector>, store: Arc<ActivityStore>) -> DetectionCycle {
        DetectionCycle {
            detectors: DetectorSet::new(
                vec![Box::new(CrmDetector::new(inspector.clone(), vec!["crm".to_string()]))],
                Dispatcher::new(store, Arc::new(CountingTrigger::default())),
            ),
            inspector,
            usage: Arc::new(Mutex::new(UsageSessionTracker::new())),
        }
    }

    #[tokio::test]
    async fn loop_survives_a_panicking_inspector() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ActivityStore::new(dir.path()));
        let inspector = Arc::new(FakeInspector::default());
        inspector.focus(WindowInfo::titled("Deals - MyCRM"));
        *inspector.panics.lock().unwrap() = 1;

        let running = Arc::new(AtomicBool::new(true));
        let handle = start_tracking(crm_cycle(inspector.clone(), store.clone()), running.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!handle.is_finished());
        assert_eq!(*inspector.panics.lock().unwrap(), 0);
        assert_eq!(store.counters().get(ActivityKind::CrmAccess), 1);

        running.store(false, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop exits after flag clears")
            .unwrap();
    }

    #[test]
    fn panic_payloads_are_readable() {
        let payload = panic::catch_unwind(|| panic!("boom {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom 7");
    }

    #[tokio::test]
    async fn loop_records_and_tracks_usage_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ActivityStore::new(dir.path()));
        let inspector = Arc::new(FakeInspector::default());
        inspector.focus(WindowInfo::titled("Leads - MyCRM"));
        let usage = Arc::new(Mutex::new(UsageSessionTracker::new()));

        let cycle = DetectionCycle {
            detectors: DetectorSet::new(
                vec![
                    Box::new(CrmDetector::new(inspector.clone(), vec!["crm".to_string()])),
                    Box::new(ProcessDetector::new(inspector.clone())),
                ],
                Dispatcher::new(store.clone(), Arc::new(CountingTrigger::default())),
            ),
            inspector: inspector.clone(),
            usage: usage.clone(),
        };

        let running = Arc::new(AtomicBool::new(true));
        let handle = start_tracking(cycle, running.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(200)).await;
        running.store(false, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop exits after flag clears")
            .unwrap();

        let counters = store.counters();
        assert_eq!(counters.get(ActivityKind::CrmAccess), 1);
        assert_eq!(counters.get(ActivityKind::ProcessActivity), 1);
        assert!(usage.lock().unwrap().is_active());
    }
}
