//! Owns every shared component and the lifecycle of the workers.

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use tokio::task::JoinHandle;

use super::activity_store::ActivityStore;
use super::activity_tracker::{start_tracking, DetectionCycle};
use super::detectors::{
    ClientDetector, CrmDetector, Detector, DetectorSet, Dispatcher, PhoneDetector, ProcessDetector, WebsiteDetector,
};
use super::recording::{NativeEncoder, RecorderConfig, RecordingController, VideoEncoder};
use super::screen_capture::{OcrTextExtractor, XcapGrabber};
use super::usage_tracker::UsageSessionTracker;
use super::vision::VisionWorker;
use crate::models::{ActivityKind, MonitorStats, Settings};
use crate::sensors::camera::FfmpegCamera;
use crate::sensors::classifier::HttpClassifier;
use crate::sensors::{Classifier, FrameSource, ScreenGrabber, TextExtractor, WindowInspector};
use crate::utils::windows::DesktopInspector;

const VISION_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// The leaf collaborators the monitor is wired with. The detection path and
/// the recorder get separate grabbers.
pub struct Sensors {
    pub inspector: Arc<dyn WindowInspector>,
    pub detection_grabber: Arc<dyn ScreenGrabber>,
    pub recording_grabber: Arc<dyn ScreenGrabber>,
    pub text_extractor: Option<Arc<dyn TextExtractor>>,
    pub encoder: Arc<dyn VideoEncoder>,
    pub camera: Option<Box<dyn FrameSource>>,
    pub classifier: Option<Box<dyn Classifier>>,
}

impl Sensors {
    pub fn desktop(settings: &Settings) -> Self {
        let camera: Option<Box<dyn FrameSource>> = settings
            .camera_url
            .as_ref()
            .map(|url| Box::new(FfmpegCamera::new(settings.recording.ffmpeg_path.clone(), url.clone())) as Box<dyn FrameSource>);
        let classifier: Option<Box<dyn Classifier>> = settings
            .classifier_url
            .as_ref()
            .map(|url| Box::new(HttpClassifier::new(url.clone())) as Box<dyn Classifier>);
        let text_extractor: Option<Arc<dyn TextExtractor>> = settings
            .tracking
            .ocr_enabled
            .then(|| Arc::new(OcrTextExtractor::new(settings.tracking.ocr_languages.clone())) as Arc<dyn TextExtractor>);

        Self {
            inspector: Arc::new(DesktopInspector::new()),
            detection_grabber: Arc::new(XcapGrabber::new()),
            recording_grabber: Arc::new(XcapGrabber::new()),
            text_extractor,
            encoder: Arc::new(NativeEncoder::new(settings.recording.ffmpeg_path.clone())),
            camera,
            classifier,
        }
    }
}

/// Handles the HTTP layer reads from.
#[derive(Clone)]
pub struct MonitorHandles {
    pub store: Arc<ActivityStore>,
    pub recorder: Arc<RecordingController>,
    pub usage: Arc<Mutex<UsageSessionTracker>>,
}

impl MonitorHandles {
    pub fn stats(&self, now: DateTime<Local>) -> MonitorStats {
        let counters = self.store.counters();
        let recording = self.recorder.status();
        let (sessions, seconds) = {
            let usage = match self.usage.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            (usage.sessions().len(), usage.total_active_seconds(now))
        };

        MonitorStats {
            crm_access_count: counters.get(ActivityKind::CrmAccess),
            phone_usage_count: counters.get(ActivityKind::PhoneUsage),
            client_interactions_count: counters.get(ActivityKind::ClientInteraction),
            website_visits_count: counters.get(ActivityKind::WebsiteVisit),
            process_activity_count: counters.get(ActivityKind::ProcessActivity),
            unique_websites_count: counters.websites.len(),
            computer_sessions_count: sessions,
            total_computer_time_hours: MonitorStats::hours(seconds),
            is_recording: recording.is_recording,
            recording_event_type: recording.event_type,
        }
    }
}

struct PendingWorkers {
    cycle: DetectionCycle,
    vision: Option<(Box<dyn FrameSource>, PhoneDetector)>,
}

pub struct Monitor {
    settings: Settings,
    handles: MonitorHandles,
    dispatcher: Dispatcher,
    running: Arc<AtomicBool>,
    pending: Option<PendingWorkers>,
    detection_task: Option<JoinHandle<()>>,
    vision_worker: Option<VisionWorker>,
}

impl Monitor {
    pub fn new(settings: Settings, sensors: Sensors) -> Result<Self> {
        fs::create_dir_all(&settings.output_dir)
            .with_context(|| format!("failed to create output directory {}", settings.output_dir.display()))?;
        fs::create_dir_all(settings.videos_dir())
            .with_context(|| format!("failed to create video directory {}", settings.videos_dir().display()))?;

        let store = Arc::new(ActivityStore::new(settings.output_dir.clone()));
        let recorder = Arc::new(RecordingController::new(
            RecorderConfig::from_settings(&settings),
            sensors.recording_grabber,
            sensors.encoder,
        ));
        let usage = Arc::new(Mutex::new(UsageSessionTracker::new()));
        let dispatcher = Dispatcher::new(store.clone(), recorder.clone());

        let mut client = ClientDetector::new(sensors.inspector.clone());
        if let Some(extractor) = sensors.text_extractor {
            client = client.with_ocr(sensors.detection_grabber, extractor);
        }
        let detectors: Vec<Box<dyn Detector>> = vec![
            Box::new(CrmDetector::new(sensors.inspector.clone(), settings.crm_keywords.clone())),
            Box::new(client),
            Box::new(WebsiteDetector::new(sensors.inspector.clone())),
            Box::new(ProcessDetector::new(sensors.inspector.clone())),
        ];

        let vision = match (sensors.camera, sensors.classifier) {
            (Some(camera), Some(classifier)) => Some((camera, PhoneDetector::new(classifier))),
            (Some(_), None) => {
                log::warn!("[Vision] Camera configured without a classifier endpoint, phone detection disabled");
                None
            }
            _ => None,
        };

        Ok(Self {
            pending: Some(PendingWorkers {
                cycle: DetectionCycle {
                    detectors: DetectorSet::new(detectors, dispatcher.clone()),
                    inspector: sensors.inspector,
                    usage: usage.clone(),
                },
                vision,
            }),
            handles: MonitorHandles { store, recorder, usage },
            dispatcher,
            settings,
            running: Arc::new(AtomicBool::new(false)),
            detection_task: None,
            vision_worker: None,
        })
    }

    pub fn handles(&self) -> MonitorHandles {
        self.handles.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawns the detection and vision workers. Must be called from within
    /// a tokio runtime; a monitor can be started once.
    pub fn start(&mut self) -> Result<()> {
        let Some(pending) = self.pending.take() else {
            bail!("monitor already started");
        };
        self.running.store(true, Ordering::SeqCst);

        let tracking = &self.settings.tracking;
        self.detection_task = Some(start_tracking(
            pending.cycle,
            self.running.clone(),
            Duration::from_millis(tracking.detection_interval_ms),
        ));

        if let Some((camera, detector)) = pending.vision {
            let worker = VisionWorker::spawn(
                camera,
                detector,
                self.dispatcher.clone(),
                self.running.clone(),
                Duration::from_millis(tracking.vision_interval_ms),
            )
            .context("failed to spawn vision worker")?;
            self.vision_worker = Some(worker);
        } else {
            log::info!("[Vision] No camera configured, phone detection disabled");
        }

        log::info!(
            "[Monitor] Monitoring started, logs in {}",
            self.settings.output_dir.display()
        );
        Ok(())
    }

    /// Clears the running flag, waits for every worker, closes the open usage
    /// session and logs the final report.
    pub async fn stop(&mut self) -> MonitorStats {
        self.running.store(false, Ordering::SeqCst);

        if let Some(task) = self.detection_task.take() {
            if let Err(e) = task.await {
                log::error!("[Monitor] Detection task failed to join: {}", e);
            }
        }

        let vision = self.vision_worker.take();
        let recorder = self.handles.recorder.clone();
        let joined = tokio::task::spawn_blocking(move || {
            if let Some(worker) = vision {
                worker.join(VISION_JOIN_TIMEOUT);
            }
            recorder.shutdown();
        })
        .await;
        if let Err(e) = joined {
            log::error!("[Monitor] Worker shutdown failed: {}", e);
        }

        let now = Local::now();
        match self.handles.usage.lock() {
            Ok(mut usage) => usage.close(now),
            Err(poisoned) => poisoned.into_inner().close(now),
        }

        let stats = self.handles.stats(now);
        log_report(&stats);
        stats
    }
}

fn log_report(stats: &MonitorStats) {
    log::info!("[Monitor] ===== Activity report =====");
    log::info!("[Monitor] CRM access: {}", stats.crm_access_count);
    log::info!("[Monitor] Phone usage: {}", stats.phone_usage_count);
    log::info!("[Monitor] Client interactions: {}", stats.client_interactions_count);
    log::info!(
        "[Monitor] Website visits: {} ({} unique)",
        stats.website_visits_count,
        stats.unique_websites_count
    );
    log::info!("[Monitor] Process switches: {}", stats.process_activity_count);
    log::info!(
        "[Monitor] Computer sessions: {}, total {:.2}h",
        stats.computer_sessions_count,
        stats.total_computer_time_hours
    );
}
