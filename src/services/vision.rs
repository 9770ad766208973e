use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Local;

use super::activity_tracker::panic_message;
use super::detectors::{Dispatcher, PhoneDetector};
use crate::sensors::FrameSource;

const CAMERA_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Camera loop on its own OS thread; frame reads and classifier calls block.
pub struct VisionWorker {
    handle: Option<JoinHandle<()>>,
    done: Receiver<()>,
}

impl VisionWorker {
    pub fn spawn(
        mut source: Box<dyn FrameSource>,
        mut detector: PhoneDetector,
        dispatcher: Dispatcher,
        running: Arc<AtomicBool>,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let (done_tx, done) = mpsc::channel();

        let handle = thread::Builder::new().name("vision-capture".into()).spawn(move || {
            log::info!("[Vision] Camera loop started");
            let mut failing = false;

            while running.load(Ordering::SeqCst) {
                let started = Instant::now();
                let step = panic::catch_unwind(AssertUnwindSafe(|| {
                    match source.read_frame() {
                        Ok(frame) => {
                            if failing {
                                log::info!("[Vision] Camera recovered");
                                failing = false;
                            }
                            let now = Local::now();
                            if let Some(fire) = detector.inspect(&frame, now) {
                                dispatcher.dispatch(fire, now);
                            }
                            interval.saturating_sub(started.elapsed())
                        }
                        Err(e) => {
                            if !failing {
                                log::warn!("[Vision] {}; retrying every {}s", e, CAMERA_RETRY_DELAY.as_secs());
                                failing = true;
                            }
                            CAMERA_RETRY_DELAY
                        }
                    }
                }));

                let pause = step.unwrap_or_else(|payload| {
                    log::error!("[Vision] Frame step panicked: {}", panic_message(payload.as_ref()));
                    CAMERA_RETRY_DELAY
                });
                thread::sleep(pause);
            }

            log::info!("[Vision] Camera loop stopped");
            let _ = done_tx.send(());
        })?;

        Ok(Self {
            handle: Some(handle),
            done,
        })
    }

    /// Waits up to `timeout` for the loop to notice the cleared flag. A loop
    /// stuck in a camera read is left detached.
    pub fn join(mut self, timeout: Duration) -> bool {
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    if let Err(e) = handle.join() {
                        log::error!("[Vision] Camera thread panicked: {:?}", e);
                    }
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("[Vision] Camera thread still blocked after {:?}, detaching", timeout);
                false
            }
        }
    }
}
