use serde::{Deserialize, Serialize};

/// Screen rectangle in virtual-desktop coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRegion {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRegion {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub title: String,
    /// Executable file name, when the platform reports one.
    pub process_name: Option<String>,
    pub process_path: Option<String>,
    pub bounds: CaptureRegion,
    pub visible: bool,
}

impl WindowInfo {
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            process_name: None,
            process_path: None,
            bounds: CaptureRegion::new(0, 0, 0, 0),
            visible: true,
        }
    }
}

/// One object found by the vision classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "class")]
    pub class_name: String,
    pub confidence: f64,
    #[serde(rename = "box", default)]
    pub bbox: [f64; 4],
}
