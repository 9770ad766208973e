//! Screen grabbing and OCR on top of `xcap`, the Windows OCR engine and the
//! `tesseract` command line elsewhere.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use image::RgbaImage;

use crate::models::CaptureRegion;
use crate::sensors::{Frame, ScreenGrabber, SensorError, TextExtractor};

const MAX_OCR_CHARS: usize = 2000;

/// Grabs monitor pixels through `xcap`. Each worker owns its own instance so
/// the recorder never shares a capture handle with the detectors.
#[derive(Debug, Default, Clone, Copy)]
pub struct XcapGrabber;

impl XcapGrabber {
    pub fn new() -> Self {
        Self
    }
}

fn capture_error(context: &str, e: impl std::fmt::Display) -> SensorError {
    SensorError::Capture(format!("{}: {}", context, e))
}

fn region_of(monitor: &xcap::Monitor) -> CaptureRegion {
    CaptureRegion::new(monitor.x(), monitor.y(), monitor.width(), monitor.height())
}

fn contains_point(outer: &CaptureRegion, x: i32, y: i32) -> bool {
    x >= outer.left
        && y >= outer.top
        && i64::from(x) < i64::from(outer.left) + i64::from(outer.width)
        && i64::from(y) < i64::from(outer.top) + i64::from(outer.height)
}

fn primary_monitor() -> Result<xcap::Monitor, SensorError> {
    let monitors = xcap::Monitor::all().map_err(|e| capture_error("Monitor list", e))?;
    let mut fallback = None;
    for monitor in monitors {
        if monitor.is_primary() {
            return Ok(monitor);
        }
        fallback.get_or_insert(monitor);
    }
    fallback.ok_or_else(|| SensorError::Capture("No monitor found".to_string()))
}

/// Monitor whose area holds the region's top-left corner, else the primary.
fn monitor_for(region: &CaptureRegion) -> Result<xcap::Monitor, SensorError> {
    let monitors = xcap::Monitor::all().map_err(|e| capture_error("Monitor list", e))?;
    match monitors
        .into_iter()
        .find(|m| contains_point(&region_of(m), region.left, region.top))
    {
        Some(monitor) => Ok(monitor),
        None => primary_monitor(),
    }
}

/// Intersection of `region` with `monitor`, in monitor-local pixels.
fn local_crop(monitor: &CaptureRegion, region: &CaptureRegion) -> Option<(u32, u32, u32, u32)> {
    let left = i64::from(region.left.max(monitor.left));
    let top = i64::from(region.top.max(monitor.top));
    let right = (i64::from(region.left) + i64::from(region.width))
        .min(i64::from(monitor.left) + i64::from(monitor.width));
    let bottom = (i64::from(region.top) + i64::from(region.height))
        .min(i64::from(monitor.top) + i64::from(monitor.height));

    if right <= left || bottom <= top {
        return None;
    }
    Some((
        (left - i64::from(monitor.left)) as u32,
        (top - i64::from(monitor.top)) as u32,
        (right - left) as u32,
        (bottom - top) as u32,
    ))
}

impl ScreenGrabber for XcapGrabber {
    fn primary_region(&self) -> Result<CaptureRegion, SensorError> {
        primary_monitor().map(|m| region_of(&m))
    }

    fn grab(&self, region: &CaptureRegion) -> Result<Frame, SensorError> {
        let monitor = monitor_for(region)?;
        let bounds = region_of(&monitor);

        let img = monitor.capture_image().map_err(|e| capture_error("Monitor capture", e))?;
        let (width, height) = (img.width(), img.height());
        let screenshot = RgbaImage::from_raw(width, height, img.into_raw())
            .ok_or_else(|| SensorError::Capture("Failed to create RgbaImage from screenshot".to_string()))?;

        if *region == bounds {
            return Ok(screenshot);
        }
        let (x, y, w, h) = local_crop(&bounds, region)
            .ok_or_else(|| SensorError::Capture(format!("Region {:?} is off screen", region)))?;
        // Physical pixels can outnumber logical ones on scaled displays.
        let w = w.min(width.saturating_sub(x));
        let h = h.min(height.saturating_sub(y));
        Ok(image::imageops::crop_imm(&screenshot, x, y, w, h).to_image())
    }
}

/// Reads text off a frame. Windows uses the built-in OCR engine, other
/// platforms shell out to `tesseract`.
#[derive(Debug, Clone)]
pub struct OcrTextExtractor {
    languages: String,
}

impl OcrTextExtractor {
    pub fn new(languages: impl Into<String>) -> Self {
        Self {
            languages: languages.into(),
        }
    }
}

fn temp_image_path() -> PathBuf {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("activity_monitor_ocr_{}_{}.png", std::process::id(), seq))
}

impl TextExtractor for OcrTextExtractor {
    fn extract_text(&self, image: &Frame) -> Result<String, SensorError> {
        let temp_path = temp_image_path();
        image
            .save(&temp_path)
            .map_err(|e| SensorError::TextExtraction(format!("Save temp image: {}", e)))?;

        let raw_text = run_ocr(&temp_path, &self.languages);
        let _ = std::fs::remove_file(&temp_path);

        let cleaned = clean_ocr_text(&raw_text?);
        Ok(cleaned.chars().take(MAX_OCR_CHARS).collect())
    }
}

#[cfg(target_os = "windows")]
fn run_ocr(image_path: &Path, _languages: &str) -> Result<String, SensorError> {
    run_windows_ocr(image_path).map_err(SensorError::TextExtraction)
}

#[cfg(not(target_os = "windows"))]
fn run_ocr(image_path: &Path, languages: &str) -> Result<String, SensorError> {
    let output = std::process::Command::new("tesseract")
        .arg(image_path)
        .arg("stdout")
        .args(["-l", languages])
        .output()
        .map_err(|e| SensorError::TextExtraction(format!("tesseract: {}", e)))?;

    if !output.status.success() {
        return Err(SensorError::TextExtraction(format!(
            "tesseract exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Drops gibberish lines and collapses whitespace.
fn clean_ocr_text(text: &str) -> String {
    let lines: Vec<String> = text
        .lines()
        .map(normalize_whitespace)
        .filter(|line| line.chars().count() >= 2 && !is_gibberish_line(line))
        .collect();

    normalize_whitespace(&lines.join("\n"))
}

fn is_gibberish_line(line: &str) -> bool {
    let chars: Vec<char> = line.chars().collect();
    if chars.is_empty() {
        return true;
    }
    if chars.len() >= 80 {
        return false;
    }

    let total = chars.len() as f64;
    let weird = chars
        .iter()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace() && !",.;:!?()[]{}'\"/@#&+-_".contains(**c))
        .count() as f64
        / total;
    weird > 0.42
}

fn normalize_whitespace(input: &str) -> String {
    input
        .split(|c: char| c.is_whitespace() || c.is_control())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// ─── Windows OCR via StorageFile ───

#[cfg(target_os = "windows")]
fn run_windows_ocr(image_path: &Path) -> Result<String, String> {
    use windows::Graphics::Imaging::BitmapDecoder;
    use windows::Media::Ocr::OcrEngine;
    use windows::Storage::{FileAccessMode, StorageFile};

    let path_str = image_path.to_string_lossy().to_string();
    let hpath = windows::core::HSTRING::from(&path_str);

    let file = StorageFile::GetFileFromPathAsync(&hpath)
        .map_err(|e| format!("GetFile: {}", e))?
        .get()
        .map_err(|e| format!("GetFile await: {}", e))?;

    let stream = file
        .OpenAsync(FileAccessMode::Read)
        .map_err(|e| format!("OpenStream: {}", e))?
        .get()
        .map_err(|e| format!("OpenStream await: {}", e))?;

    let bitmap = BitmapDecoder::CreateAsync(&stream)
        .map_err(|e| format!("Decoder: {}", e))?
        .get()
        .map_err(|e| format!("Decoder await: {}", e))?
        .GetSoftwareBitmapAsync()
        .map_err(|e| format!("Bitmap: {}", e))?
        .get()
        .map_err(|e| format!("Bitmap await: {}", e))?;

    let engine = OcrEngine::TryCreateFromUserProfileLanguages().map_err(|e| format!("OcrEngine: {}", e))?;
    let result = engine
        .RecognizeAsync(&bitmap)
        .map_err(|e| format!("Recognize: {}", e))?
        .get()
        .map_err(|e| format!("Recognize await: {}", e))?;

    Ok(result.Text().map_err(|e| format!("Text: {}", e))?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_is_clamped_to_monitor() {
        let monitor = CaptureRegion::new(1920, 0, 1280, 1024);
        let window = CaptureRegion::new(1900, 100, 400, 300);
        assert_eq!(local_crop(&monitor, &window), Some((0, 100, 380, 300)));

        let elsewhere = CaptureRegion::new(0, 0, 100, 100);
        assert_eq!(local_crop(&monitor, &elsewhere), None);
    }

    #[test]
    fn point_lookup_respects_monitor_edges() {
        let monitor = CaptureRegion::new(-1280, 0, 1280, 1024);
        assert!(contains_point(&monitor, -1280, 0));
        assert!(!contains_point(&monitor, 0, 0));
    }

    #[test]
    fn cleaning_drops_noise_lines() {
        let raw = "Customer:  Acme   Ltd\n~~|\\^^\n x\nInvoice #42\n";
        assert_eq!(clean_ocr_text(raw), "Customer: Acme Ltd Invoice #42");
    }
}
