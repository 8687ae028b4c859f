//! Request dispatch: parser → image pipeline → detector → selection.
//!
//! [`DetectionService`] is the one place where recoverable failures are
//! caught. Both front-ends hold it behind an `Arc` and only ever see a
//! [`DetectResponse`] (plus, for HTTP, the failure class).

use std::sync::Arc;

use crate::detector::{select_detection, Detection, Detector};
use crate::error::{DetectError, DetectorError};
use crate::pipeline::load_image;
use crate::protocol::{parse_request, DetectResponse};

/// Shared detection pipeline wrapping the external detector.
#[derive(Debug, Clone)]
pub struct DetectionService {
    detector: Arc<dyn Detector>,
}

impl DetectionService {
    /// Create a service around a detector.
    pub fn new(detector: Arc<dyn Detector>) -> Self {
        Self { detector }
    }

    /// Process one raw frame, returning the selected detection or the failure.
    pub async fn detect_frame(&self, frame: &[u8]) -> Result<Option<Detection>, DetectError> {
        let data = parse_request(frame)?;
        log::debug!("[Service] Request payload: {} base64 chars", data.len());
        self.detect_payload(data).await
    }

    /// Process an already-extracted base64 payload.
    pub async fn detect_payload(&self, data: String) -> Result<Option<Detection>, DetectError> {
        let image = tokio::task::spawn_blocking(move || load_image(&data))
            .await
            .map_err(|e| DetectError::Internal(format!("image decoding task failed: {e}")))??;

        // Run on its own task so a panicking detector cannot take the caller down
        let detector = Arc::clone(&self.detector);
        let candidates = tokio::spawn(async move { detector.detect(image).await })
            .await
            .map_err(|e| DetectorError::Aborted(e.to_string()))??;
        log::debug!("[Service] Detector returned {} candidates", candidates.len());

        Ok(select_detection(&candidates))
    }

    /// Process one frame and always produce a response.
    ///
    /// Failures are logged and answered with `{"object":"none"}`.
    pub async fn respond(&self, frame: &[u8]) -> DetectResponse {
        match self.detect_frame(frame).await {
            Ok(detection) => {
                log_detection(detection.as_ref());
                DetectResponse::from_detection(detection.as_ref())
            }
            Err(e) => {
                log_failure(&e);
                DetectResponse::none()
            }
        }
    }
}

/// Log the outcome of a successful dispatch.
pub(crate) fn log_detection(detection: Option<&Detection>) {
    match detection {
        Some(detection) => log::info!(
            "[Service] Detected: {} ({:.2})",
            detection.label,
            detection.confidence
        ),
        None => log::info!("[Service] No objects detected"),
    }
}

/// Log a recoverable failure at a level matching who is at fault.
pub(crate) fn log_failure(error: &DetectError) {
    match error {
        DetectError::Protocol(_) | DetectError::ImageDecode(_) => {
            log::warn!("[Service] Request rejected: {error}");
        }
        DetectError::Malformed(_)
        | DetectError::Decode(_)
        | DetectError::Detector(_)
        | DetectError::Internal(_) => {
            log::error!("[Service] Request failed: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{Candidate, NullDetector};
    use crate::pipeline::tests::png_base64;
    use async_trait::async_trait;
    use image::RgbImage;

    #[derive(Debug)]
    struct FixedDetector(Vec<Candidate>);

    #[async_trait]
    impl Detector for FixedDetector {
        async fn detect(&self, _image: RgbImage) -> Result<Vec<Candidate>, DetectorError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Debug)]
    struct FailingDetector;

    #[async_trait]
    impl Detector for FailingDetector {
        async fn detect(&self, _image: RgbImage) -> Result<Vec<Candidate>, DetectorError> {
            Err(DetectorError::Aborted("model crashed".into()))
        }
    }

    #[derive(Debug)]
    struct PanickingDetector;

    #[async_trait]
    impl Detector for PanickingDetector {
        async fn detect(&self, _image: RgbImage) -> Result<Vec<Candidate>, DetectorError> {
            panic!("inference blew up");
        }
    }

    fn service(detector: impl Detector + 'static) -> DetectionService {
        DetectionService::new(Arc::new(detector))
    }

    fn request(data: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({"type": "image", "data": data})).unwrap()
    }

    #[tokio::test]
    async fn test_detection_reported() {
        let service = service(FixedDetector(vec![
            Candidate::new("cat", 0.65),
            Candidate::new("Dog", 0.92),
        ]));
        let response = service.respond(&request(&png_base64(8, 8))).await;
        assert_eq!(response.object, "dog");
    }

    #[tokio::test]
    async fn test_no_candidates_is_none() {
        let response = service(NullDetector).respond(&request(&png_base64(8, 8))).await;
        assert_eq!(response, DetectResponse::none());
    }

    #[tokio::test]
    async fn test_invalid_request_classified() {
        let result = service(NullDetector).detect_frame(br#"{"type":"image"}"#).await;
        assert!(matches!(result, Err(DetectError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_malformed_body_classified_as_server_error() {
        let service = service(NullDetector);
        for frame in [
            &b"definitely not json"[..],
            b"[1,2]",
            br#"{"type":"image","data":42}"#,
        ] {
            let err = service.detect_frame(frame).await.unwrap_err();
            assert!(matches!(err, DetectError::Malformed(_)), "frame: {frame:?}");
            assert_eq!(err.http_status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[tokio::test]
    async fn test_bad_base64_classified() {
        let result = service(NullDetector).detect_frame(&request("%%%")).await;
        assert!(matches!(result, Err(DetectError::Decode(_))));
    }

    #[tokio::test]
    async fn test_bad_image_classified() {
        let result = service(NullDetector).detect_frame(&request("aGVsbG8=")).await;
        assert!(matches!(result, Err(DetectError::ImageDecode(_))));
    }

    #[tokio::test]
    async fn test_detector_error_becomes_none() {
        let service = service(FailingDetector);
        let frame = request(&png_base64(8, 8));
        assert!(matches!(
            service.detect_frame(&frame).await,
            Err(DetectError::Detector(_))
        ));
        assert_eq!(service.respond(&frame).await, DetectResponse::none());
    }

    #[tokio::test]
    async fn test_detector_panic_becomes_none() {
        let service = service(PanickingDetector);
        let frame = request(&png_base64(8, 8));
        assert!(matches!(
            service.detect_frame(&frame).await,
            Err(DetectError::Detector(DetectorError::Aborted(_)))
        ));
        assert_eq!(service.respond(&frame).await, DetectResponse::none());
    }
}
