use chrono::{DateTime, Duration, Local};

use super::Fire;
use crate::models::{ActivityDetails, ActivityKind, Detection};
use crate::sensors::{Classifier, Frame, SensorError};
use crate::services::cooldown::CooldownGate;

const PHONE_COOLDOWN_SECS: i64 = 3;
const MIN_CONFIDENCE: f64 = 0.5;

fn is_phone(detection: &Detection) -> bool {
    let class = detection.class_name.to_lowercase();
    (class.contains("phone") || class.contains("cell")) && detection.confidence > MIN_CONFIDENCE
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Phone-in-hand detector. Unlike the window detectors it is fed camera
/// frames by the vision worker instead of polling a sensor itself.
pub struct PhoneDetector {
    classifier: Box<dyn Classifier>,
    gate: CooldownGate,
    count: u64,
}

impl PhoneDetector {
    pub fn new(classifier: Box<dyn Classifier>) -> Self {
        Self {
            classifier,
            gate: CooldownGate::global(Duration::seconds(PHONE_COOLDOWN_SECS)),
            count: 0,
        }
    }

    pub fn kind(&self) -> ActivityKind {
        ActivityKind::PhoneUsage
    }

    pub fn probe(&mut self, frame: &Frame, now: DateTime<Local>) -> Result<Option<Fire>, SensorError> {
        let detections = self.classifier.classify(frame)?;
        let Some(phone) = detections.iter().find(|d| is_phone(d)) else {
            return Ok(None);
        };
        if !self.gate.should_fire("", now) {
            return Ok(None);
        }

        self.count += 1;
        let confidence = round2(phone.confidence);
        Ok(Some(Fire {
            label: format!("Confidence {:.2}", confidence),
            details: ActivityDetails::PhoneUsage {
                confidence,
                count: self.count,
            },
        }))
    }

    pub fn inspect(&mut self, frame: &Frame, now: DateTime<Local>) -> Option<Fire> {
        match self.probe(frame, now) {
            Ok(fire) => fire,
            Err(e) => {
                log::debug!("[Phone] Frame skipped: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::TimeZone;
    use image::RgbaImage;

    use super::*;

    struct Scripted(Mutex<Vec<Result<Vec<Detection>, SensorError>>>);

    impl Classifier for Scripted {
        fn classify(&self, _frame: &Frame) -> Result<Vec<Detection>, SensorError> {
            self.0.lock().unwrap().remove(0)
        }
    }

    fn det(class: &str, confidence: f64) -> Detection {
        Detection {
            class_name: class.to_string(),
            confidence,
            bbox: [0.0; 4],
        }
    }

    fn t(secs: i64) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 4, 6, 13, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn confident_phone_fires_with_rounded_confidence() {
        let classifier = Scripted(Mutex::new(vec![
            Ok(vec![det("person", 0.99), det("cell phone", 0.876)]),
            Ok(vec![det("cell phone", 0.9)]),
            Ok(vec![det("cell phone", 0.9)]),
        ]));
        let mut detector = PhoneDetector::new(Box::new(classifier));
        let frame = RgbaImage::new(4, 4);

        let fire = detector.inspect(&frame, t(0)).unwrap();
        assert_eq!(
            fire.details,
            ActivityDetails::PhoneUsage {
                confidence: 0.88,
                count: 1
            }
        );
        assert!(detector.inspect(&frame, t(2)).is_none());
        assert!(detector.inspect(&frame, t(4)).is_some());
    }

    #[test]
    fn weak_or_unrelated_detections_are_ignored() {
        let classifier = Scripted(Mutex::new(vec![
            Ok(vec![det("cell phone", 0.5), det("laptop", 0.95)]),
            Err(SensorError::Classifier("timeout".to_string())),
            Ok(vec![det("Phone", 0.51)]),
        ]));
        let mut detector = PhoneDetector::new(Box::new(classifier));
        let frame = RgbaImage::new(4, 4);

        assert!(detector.inspect(&frame, t(0)).is_none());
        assert!(detector.inspect(&frame, t(1)).is_none());
        assert!(detector.inspect(&frame, t(2)).is_some());
    }
}
