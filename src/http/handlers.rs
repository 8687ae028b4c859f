//! Request handlers for the HTTP front-end.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::protocol::DetectResponse;
use crate::service::{log_detection, log_failure, DetectionService};

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// `POST /detect`
///
/// The body is parsed by the same parser as socket frames. A missing or wrong
/// field is a 400; a body that is not a JSON object is a 500.
pub async fn detect(
    State(service): State<Arc<DetectionService>>,
    body: Bytes,
) -> (StatusCode, Json<DetectResponse>) {
    log::info!("[Http] Received detect request: {} bytes", body.len());
    match service.detect_frame(&body).await {
        Ok(detection) => {
            log_detection(detection.as_ref());
            (
                StatusCode::OK,
                Json(DetectResponse::from_detection(detection.as_ref())),
            )
        }
        Err(e) => {
            log_failure(&e);
            (e.http_status(), Json(DetectResponse::none()))
        }
    }
}
