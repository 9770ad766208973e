//! Capability interfaces over the leaf collaborators: the OS window
//! inspector, screen grabber, OCR engine, camera and vision classifier.
//!
//! Detectors and workers only ever see these traits, so every one of them
//! can be replaced by an in-memory fake in tests.

use image::RgbaImage;
use thiserror::Error;

use crate::models::{CaptureRegion, Detection, WindowInfo};

pub mod camera;
pub mod classifier;

pub type Frame = RgbaImage;

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("window inspector unavailable: {0}")]
    Window(String),
    #[error("screen capture failed: {0}")]
    Capture(String),
    #[error("text extraction failed: {0}")]
    TextExtraction(String),
    #[error("camera read failed: {0}")]
    Camera(String),
    #[error("classifier failed: {0}")]
    Classifier(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub trait WindowInspector: Send + Sync {
    /// Foreground window, `None` when nothing has focus (locked, idle desktop).
    fn active_window(&self) -> Result<Option<WindowInfo>, SensorError>;

    fn visible_windows(&self) -> Result<Vec<WindowInfo>, SensorError>;
}

pub trait ScreenGrabber: Send + Sync {
    /// Bounds of the primary display.
    fn primary_region(&self) -> Result<CaptureRegion, SensorError>;

    fn grab(&self, region: &CaptureRegion) -> Result<Frame, SensorError>;
}

pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, image: &Frame) -> Result<String, SensorError>;
}

pub trait Classifier: Send {
    fn classify(&self, frame: &Frame) -> Result<Vec<Detection>, SensorError>;
}

pub trait FrameSource: Send {
    fn read_frame(&mut self) -> Result<Frame, SensorError>;
}
