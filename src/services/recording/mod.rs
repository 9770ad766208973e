//! Event-triggered screen recording.
//!
//! One session at a time: Idle -> Starting -> Capturing -> Finalizing -> Idle.
//! The Idle check and the move to Starting happen under one lock, so
//! concurrent requests from different detectors cannot both win. All of the
//! blocking work (encoder probing, frame grabs, writes, recovery) runs on
//! the session's own thread.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use crate::models::{CaptureRegion, EncoderCandidate, RecorderState, RecordingSession, RecordingStatus, Settings};
use crate::sensors::{Frame, ScreenGrabber};

use super::detectors::RecordingTrigger;

pub mod encoder;

pub use encoder::{EncoderError, FrameSink, NativeEncoder, VideoEncoder};

const GRAB_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub videos_dir: PathBuf,
    pub duration: Duration,
    pub fps: u32,
    pub buffer_frames: usize,
    pub candidates: Vec<EncoderCandidate>,
}

impl RecorderConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let candidates = if settings.recording.encoders.is_empty() {
            EncoderCandidate::defaults()
        } else {
            settings.recording.encoders.clone()
        };

        Self {
            videos_dir: settings.videos_dir(),
            duration: Duration::from_secs(settings.recording.duration_secs),
            fps: settings.recording.fps.max(1),
            buffer_frames: settings.recording.buffer_frames,
            candidates,
        }
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)))
    }
}

#[derive(Debug, Default)]
struct SessionSlot {
    state: RecorderState,
    event_type: Option<String>,
    session: Option<RecordingSession>,
}

fn lock_slot(slot: &Mutex<SessionSlot>) -> MutexGuard<'_, SessionSlot> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub struct RecordingController {
    config: RecorderConfig,
    grabber: Arc<dyn ScreenGrabber>,
    encoder: Arc<dyn VideoEncoder>,
    slot: Arc<Mutex<SessionSlot>>,
    stop_flag: Arc<AtomicBool>,
    closed: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RecordingController {
    pub fn new(config: RecorderConfig, grabber: Arc<dyn ScreenGrabber>, encoder: Arc<dyn VideoEncoder>) -> Self {
        Self {
            config,
            grabber,
            encoder,
            slot: Arc::new(Mutex::new(SessionSlot::default())),
            stop_flag: Arc::new(AtomicBool::new(false)),
            closed: AtomicBool::new(false),
            worker: Mutex::new(None),
        }
    }

    /// Starts a session unless one is already in progress or the recorder
    /// has been shut down. Returns whether this call started it.
    pub fn start(&self, event_type: &str, label: &str) -> bool {
        let mut worker = self.lock_worker();
        if self.closed.load(Ordering::SeqCst) {
            log::debug!("[Recorder] Shut down, ignoring {} request", event_type);
            return false;
        }
        {
            let mut slot = lock_slot(&self.slot);
            if slot.state != RecorderState::Idle {
                return false;
            }
            slot.state = RecorderState::Starting;
            slot.event_type = Some(event_type.to_string());
        }
        self.stop_flag.store(false, Ordering::SeqCst);

        let job = SessionJob {
            config: self.config.clone(),
            grabber: self.grabber.clone(),
            encoder: self.encoder.clone(),
            slot: self.slot.clone(),
            stop_flag: self.stop_flag.clone(),
            event_type: event_type.to_string(),
            label: label.to_string(),
            started_at: Local::now(),
        };

        let spawned = thread::Builder::new()
            .name("screen-recorder".into())
            .spawn(move || job.run());

        match spawned {
            Ok(handle) => {
                if let Some(previous) = worker.replace(handle) {
                    // The previous session already went back to Idle.
                    let _ = previous.join();
                }
                log::info!("[Recorder] Recording started: {} ({})", event_type, label);
                true
            }
            Err(e) => {
                log::error!("[Recorder] Failed to spawn recording thread: {}", e);
                let mut slot = lock_slot(&self.slot);
                slot.state = RecorderState::Idle;
                slot.event_type = None;
                false
            }
        }
    }

    /// Ends the active session early and waits for finalization.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.wait();
    }

    /// Refuses every later `start`, then stops the active session.
    pub fn shutdown(&self) {
        {
            // Serialized with `start` so no session slips in after the flag.
            let _worker = self.lock_worker();
            self.closed.store(true, Ordering::SeqCst);
        }
        self.stop();
    }

    /// Blocks until the current session, if any, has returned to Idle.
    pub fn wait(&self) {
        let handle = self.lock_worker().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.join() {
                log::error!("[Recorder] Recording thread panicked: {:?}", e);
            }
        }
    }

    pub fn status(&self) -> RecordingStatus {
        let slot = lock_slot(&self.slot);
        RecordingStatus {
            is_recording: slot.state != RecorderState::Idle,
            event_type: slot.event_type.clone(),
            state: slot.state,
            session: slot.session.clone(),
        }
    }

    /// Clip currently being written, hidden from the finished-video listing.
    pub fn active_file(&self) -> Option<PathBuf> {
        lock_slot(&self.slot).session.as_ref().map(|s| s.file_path.clone())
    }

    pub fn videos_dir(&self) -> &Path {
        &self.config.videos_dir
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl RecordingTrigger for RecordingController {
    fn request_recording(&self, event_type: &str, label: &str) -> bool {
        self.start(event_type, label)
    }
}

/// Returns the slot to Idle however the session thread exits.
struct SlotReset(Arc<Mutex<SessionSlot>>);

impl Drop for SlotReset {
    fn drop(&mut self) {
        let mut slot = lock_slot(&self.0);
        slot.state = RecorderState::Idle;
        slot.event_type = None;
        slot.session = None;
    }
}

struct SessionJob {
    config: RecorderConfig,
    grabber: Arc<dyn ScreenGrabber>,
    encoder: Arc<dyn VideoEncoder>,
    slot: Arc<Mutex<SessionSlot>>,
    stop_flag: Arc<AtomicBool>,
    event_type: String,
    label: String,
    started_at: DateTime<Local>,
}

impl SessionJob {
    fn run(self) {
        let _reset = SlotReset(self.slot.clone());

        let region = match self.grabber.primary_region() {
            Ok(region) if !region.is_empty() => region,
            Ok(region) => {
                log::error!("[Recorder] Primary display reports empty bounds {:?}", region);
                return;
            }
            Err(e) => {
                log::error!("[Recorder] Could not read display geometry: {}", e);
                return;
            }
        };

        if let Err(e) = fs::create_dir_all(&self.config.videos_dir) {
            log::error!(
                "[Recorder] Cannot create {}: {}",
                self.config.videos_dir.display(),
                e
            );
            return;
        }

        let stem = format!("{}_{}", self.event_type, self.started_at.format("%Y-%m-%d_%H-%M-%S"));
        let candidate = self.select_encoder(&stem, &region);
        let file_path = self.clip_path(&stem, &candidate);

        let mut sink = match self
            .encoder
            .open(&candidate, &file_path, self.config.fps, region.width, region.height)
        {
            Ok(sink) => Some(sink),
            Err(e) => {
                log::warn!("[Recorder] {}; frames go to the recovery buffer only", e);
                None
            }
        };

        {
            let mut slot = lock_slot(&self.slot);
            slot.session = Some(RecordingSession {
                event_type: self.event_type.clone(),
                label: self.label.clone(),
                started_at: self.started_at,
                duration_budget_secs: self.config.duration.as_secs_f64(),
                file_path: file_path.clone(),
                geometry: region,
                encoder: candidate.clone(),
            });
            slot.state = RecorderState::Capturing;
        }

        let capture_started = Instant::now();
        let (frames, buffer) = self.capture(&region, &mut sink);

        lock_slot(&self.slot).state = RecorderState::Finalizing;

        if let Some(sink) = sink {
            if let Err(e) = sink.finish() {
                log::warn!("[Recorder] Closing {} failed: {}", file_path.display(), e);
            }
        }

        let saved = if has_content(&file_path) {
            Some(file_path)
        } else {
            log::warn!("[Recorder] {} is empty, replaying {} buffered frames", file_path.display(), buffer.len());
            let _ = fs::remove_file(&file_path);
            self.recover(&stem, &region, &buffer)
        };

        match saved {
            Some(path) => {
                let size_mb = fs::metadata(&path).map(|m| m.len() as f64 / (1024.0 * 1024.0)).unwrap_or(0.0);
                log::info!(
                    "[Recorder] Saved {} ({:.1}s, {:.2}MB, {} frames)",
                    path.display(),
                    capture_started.elapsed().as_secs_f64(),
                    size_mb,
                    frames
                );
            }
            None => log::error!("[Recorder] No clip produced for {} event", self.event_type),
        }
    }

    fn clip_path(&self, stem: &str, candidate: &EncoderCandidate) -> PathBuf {
        self.config
            .videos_dir
            .join(format!("{}.{}", stem, candidate.extension))
    }

    /// First candidate that opens and closes cleanly, or the head of the list.
    fn select_encoder(&self, stem: &str, region: &CaptureRegion) -> EncoderCandidate {
        for candidate in &self.config.candidates {
            let probe = self
                .config
                .videos_dir
                .join(format!("{}_probe.{}", stem, candidate.extension));

            let outcome = self
                .encoder
                .open(candidate, &probe, self.config.fps, region.width, region.height)
                .and_then(|sink| sink.finish());
            let _ = fs::remove_file(&probe);

            match outcome {
                Ok(()) => {
                    log::debug!("[Recorder] Using encoder {}", candidate);
                    return candidate.clone();
                }
                Err(e) => log::debug!("[Recorder] Encoder {} rejected: {}", candidate, e),
            }
        }

        let fallback = self
            .config
            .candidates
            .first()
            .cloned()
            .unwrap_or_else(|| EncoderCandidate::new("GIF", "gif"));
        log::warn!("[Recorder] No encoder passed the probe, trying {} anyway", fallback);
        fallback
    }

    fn capture(&self, region: &CaptureRegion, sink: &mut Option<Box<dyn FrameSink>>) -> (usize, Vec<Frame>) {
        let deadline = Instant::now() + self.config.duration;
        let interval = self.config.frame_interval();
        let mut buffer = Vec::new();
        let mut frames = 0usize;

        while !self.stop_flag.load(Ordering::SeqCst) && Instant::now() < deadline {
            let frame = match self.grabber.grab(region) {
                Ok(frame) => frame,
                Err(e) => {
                    log::warn!("[Recorder] Frame grab failed: {}", e);
                    thread::sleep(GRAB_RETRY_DELAY);
                    continue;
                }
            };

            if let Some(sink) = sink.as_mut() {
                if let Err(e) = sink.write(&frame) {
                    log::warn!("[Recorder] Frame write failed: {}", e);
                }
            }
            if buffer.len() < self.config.buffer_frames {
                buffer.push(frame);
            }
            frames += 1;
            thread::sleep(interval);
        }

        (frames, buffer)
    }

    /// Replays the buffer through the candidate chain until one produces a
    /// non-empty file.
    fn recover(&self, stem: &str, region: &CaptureRegion, buffer: &[Frame]) -> Option<PathBuf> {
        if buffer.is_empty() {
            return None;
        }

        for candidate in &self.config.candidates {
            let path = self.clip_path(stem, candidate);
            let result = self
                .encoder
                .open(candidate, &path, self.config.fps, region.width, region.height)
                .and_then(|mut sink| {
                    for frame in buffer {
                        sink.write(frame)?;
                    }
                    sink.finish()
                });

            match result {
                Ok(()) if has_content(&path) => {
                    log::info!("[Recorder] Recovered clip with {}", candidate);
                    return Some(path);
                }
                Ok(()) => log::debug!("[Recorder] {} produced an empty file", candidate),
                Err(e) => log::debug!("[Recorder] Recovery with {} failed: {}", candidate, e),
            }
            let _ = fs::remove_file(&path);
        }
        None
    }
}

fn has_content(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}
