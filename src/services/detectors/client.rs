use std::sync::Arc;

use chrono::{DateTime, Duration, Local};

use super::{find_keyword, sanitize_label, Detector, Fire};
use crate::models::{ActivityDetails, ActivityKind, DetectionMethod, WindowInfo};
use crate::sensors::{ScreenGrabber, SensorError, TextExtractor, WindowInspector};
use crate::services::cooldown::CooldownGate;

const CLIENT_COOLDOWN_SECS: i64 = 10;

/// Client-facing terms in English, Uzbek, Russian, Turkish, Indonesian and
/// Spanish. Matched as lowercase substrings, first hit wins.
pub const CLIENT_KEYWORDS: &[&str] = &[
    "client", "mijoz", "customer", "contact", "lead", "deal", "order", "buyurtma",
    "klient", "клиент", "müşteri", "pelanggan", "cliente",
    "prospect", "potential", "opportunity", "sales", "sotuv",
    "contract", "shartnoma", "agreement", "kelishuv",
    "invoice", "hisob", "payment", "to'lov", "tolov",
    "account", "profile", "profil",
    "name", "ism", "phone", "telefon", "email", "pochta",
    "address", "manzil", "company", "kompaniya", "tashkilot",
];

/// Looks for client work in the focused window: first in its title, then
/// in the text read off its pixels when OCR is available.
pub struct ClientDetector {
    inspector: Arc<dyn WindowInspector>,
    ocr: Option<(Arc<dyn ScreenGrabber>, Arc<dyn TextExtractor>)>,
    keywords: Vec<String>,
    gate: CooldownGate,
    count: u64,
}

impl ClientDetector {
    pub fn new(inspector: Arc<dyn WindowInspector>) -> Self {
        Self {
            inspector,
            ocr: None,
            keywords: CLIENT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            gate: CooldownGate::keyed(Duration::seconds(CLIENT_COOLDOWN_SECS)),
            count: 0,
        }
    }

    pub fn with_ocr(mut self, grabber: Arc<dyn ScreenGrabber>, extractor: Arc<dyn TextExtractor>) -> Self {
        self.ocr = Some((grabber, extractor));
        self
    }

    fn keyword_on_screen(&self, window: &WindowInfo) -> Option<String> {
        let (grabber, extractor) = self.ocr.as_ref()?;
        if window.bounds.is_empty() {
            return None;
        }

        let text = grabber
            .grab(&window.bounds)
            .and_then(|frame| extractor.extract_text(&frame));

        match text {
            Ok(text) => find_keyword(&text.to_lowercase(), &self.keywords).map(str::to_string),
            Err(e) => {
                log::debug!("[Client] OCR skipped for '{}': {}", window.title, e);
                None
            }
        }
    }
}

impl Detector for ClientDetector {
    fn kind(&self) -> ActivityKind {
        ActivityKind::ClientInteraction
    }

    fn probe(&mut self, now: DateTime<Local>) -> Result<Option<Fire>, SensorError> {
        let Some(window) = self.inspector.active_window()? else {
            return Ok(None);
        };
        if !window.visible || window.title.trim().is_empty() {
            return Ok(None);
        }

        let title = window.title.to_lowercase();
        let found = match find_keyword(&title, &self.keywords) {
            Some(keyword) => Some((keyword.to_string(), DetectionMethod::Title)),
            None => self
                .keyword_on_screen(&window)
                .map(|keyword| (keyword, DetectionMethod::Ocr)),
        };

        let Some((keyword, detection_method)) = found else {
            return Ok(None);
        };
        if !self.gate.should_fire(&window.title, now) {
            return Ok(None);
        }

        self.count += 1;
        Ok(Some(Fire {
            label: sanitize_label(&window.title),
            details: ActivityDetails::ClientInteraction {
                window_title: window.title,
                keyword,
                detection_method,
                count: self.count,
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::TimeZone;
    use image::RgbaImage;

    use super::*;
    use crate::models::CaptureRegion;
    use crate::sensors::Frame;
    use crate::services::detectors::testing::FakeInspector;

    fn t(secs: i64) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 4, 3, 11, 0, 0).unwrap() + Duration::seconds(secs)
    }

    struct BlankGrabber;

    impl ScreenGrabber for BlankGrabber {
        fn primary_region(&self) -> Result<CaptureRegion, SensorError> {
            Ok(CaptureRegion::new(0, 0, 64, 48))
        }

        fn grab(&self, region: &CaptureRegion) -> Result<Frame, SensorError> {
            Ok(RgbaImage::new(region.width, region.height))
        }
    }

    struct CannedText(Mutex<Result<String, String>>);

    impl TextExtractor for CannedText {
        fn extract_text(&self, _image: &Frame) -> Result<String, SensorError> {
            self.0
                .lock()
                .unwrap()
                .clone()
                .map_err(SensorError::TextExtraction)
        }
    }

    fn sized_window(title: &str) -> WindowInfo {
        let mut window = WindowInfo::titled(title);
        window.bounds = CaptureRegion::new(10, 10, 64, 48);
        window
    }

    #[test]
    fn title_keyword_wins_over_ocr() {
        let inspector = Arc::new(FakeInspector::default());
        inspector.focus(sized_window("New Deal #118 - Pipeline"));
        let mut detector = ClientDetector::new(inspector);

        let fire = detector.evaluate(t(0)).unwrap();
        assert_eq!(
            fire.details,
            ActivityDetails::ClientInteraction {
                window_title: "New Deal #118 - Pipeline".to_string(),
                keyword: "deal".to_string(),
                detection_method: DetectionMethod::Title,
                count: 1,
            }
        );
    }

    #[test]
    fn falls_back_to_screen_text() {
        let inspector = Arc::new(FakeInspector::default());
        inspector.focus(sized_window("Untitled - Notepad"));
        let text = Arc::new(CannedText(Mutex::new(Ok("Mijoz: Aliyev\nTel".to_string()))));
        let mut detector = ClientDetector::new(inspector).with_ocr(Arc::new(BlankGrabber), text);

        let fire = detector.evaluate(t(0)).unwrap();
        match fire.details {
            ActivityDetails::ClientInteraction {
                keyword,
                detection_method,
                ..
            } => {
                assert_eq!(keyword, "mijoz");
                assert_eq!(detection_method, DetectionMethod::Ocr);
            }
            other => panic!("unexpected details: {other:?}"),
        }
    }

    #[test]
    fn ocr_failure_is_silent() {
        let inspector = Arc::new(FakeInspector::default());
        inspector.focus(sized_window("Untitled - Notepad"));
        let text = Arc::new(CannedText(Mutex::new(Err("engine missing".to_string()))));
        let mut detector = ClientDetector::new(inspector).with_ocr(Arc::new(BlankGrabber), text);

        assert!(detector.evaluate(t(0)).is_none());
    }

    #[test]
    fn title_change_bypasses_cooldown() {
        let inspector = Arc::new(FakeInspector::default());
        inspector.focus(sized_window("Customer A"));
        let mut detector = ClientDetector::new(inspector.clone());

        assert!(detector.evaluate(t(0)).is_some());
        assert!(detector.evaluate(t(3)).is_none());

        inspector.focus(sized_window("Customer B"));
        let fire = detector.evaluate(t(4)).unwrap();
        assert!(matches!(fire.details, ActivityDetails::ClientInteraction { count: 2, .. }));

        inspector.focus(sized_window("Customer B"));
        assert!(detector.evaluate(t(14)).is_none());
        assert!(detector.evaluate(t(15)).is_some());
    }
}
