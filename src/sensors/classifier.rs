use std::io::Cursor;
use std::sync::OnceLock;
use std::time::Duration;

use image::ImageFormat;
use reqwest::blocking::Client;
use serde::Deserialize;

use super::{Classifier, Frame, SensorError};
use crate::models::Detection;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassifierResponse {
    Bare(Vec<Detection>),
    Wrapped { detections: Vec<Detection> },
}

/// Object detector reached over HTTP: the frame is posted as PNG and the
/// service answers with `[{class, confidence, box}]`, optionally wrapped in
/// `{"detections": [...]}`.
pub struct HttpClassifier {
    endpoint: String,
    // Built on first use so the blocking client lives on the vision thread.
    client: OnceLock<Client>,
}

impl HttpClassifier {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: OnceLock::new(),
        }
    }

    fn client(&self) -> Result<&Client, SensorError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SensorError::Classifier(e.to_string()))?;
        Ok(self.client.get_or_init(|| client))
    }
}

fn encode_png(frame: &Frame) -> Result<Vec<u8>, SensorError> {
    let mut bytes = Vec::new();
    frame
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| SensorError::Classifier(format!("PNG encode: {}", e)))?;
    Ok(bytes)
}

impl Classifier for HttpClassifier {
    fn classify(&self, frame: &Frame) -> Result<Vec<Detection>, SensorError> {
        let body = encode_png(frame)?;
        let response = self
            .client()?
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(body)
            .send()
            .map_err(|e| SensorError::Classifier(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SensorError::Classifier(format!(
                "{} answered {}",
                self.endpoint,
                response.status()
            )));
        }

        let parsed: ClassifierResponse = response
            .json()
            .map_err(|e| SensorError::Classifier(format!("Bad response body: {}", e)))?;
        Ok(match parsed {
            ClassifierResponse::Bare(detections) => detections,
            ClassifierResponse::Wrapped { detections } => detections,
        })
    }
}

#[cfg(test)]
mod tests {
    use image::RgbaImage;

    use super::*;

    #[test]
    fn accepts_bare_and_wrapped_responses() {
        let bare: ClassifierResponse =
            serde_json::from_str(r#"[{"class": "cell phone", "confidence": 0.82, "box": [1, 2, 3, 4]}]"#).unwrap();
        let wrapped: ClassifierResponse =
            serde_json::from_str(r#"{"detections": [{"class": "person", "confidence": 0.9}]}"#).unwrap();

        match bare {
            ClassifierResponse::Bare(d) => assert_eq!(d[0].bbox, [1.0, 2.0, 3.0, 4.0]),
            other => panic!("unexpected {other:?}"),
        }
        match wrapped {
            ClassifierResponse::Wrapped { detections } => assert_eq!(detections[0].class_name, "person"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn frames_are_posted_as_png() {
        let bytes = encode_png(&RgbaImage::new(2, 2)).unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
    }

    #[test]
    fn unreachable_endpoint_is_a_classifier_error() {
        let classifier = HttpClassifier::new("http://127.0.0.1:9/detect");
        let result = classifier.classify(&RgbaImage::new(2, 2));
        assert!(matches!(result, Err(SensorError::Classifier(_))));
    }
}
