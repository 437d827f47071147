//! Remote inference backend HTTP client.
//!
//! Speaks the hazard-detection service contract: a JSON base64 endpoint
//! (`/detect-base64`) as the primary wire format and the legacy multipart
//! upload (`/detect`) as a one-shot retry path for older deployments.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use hazard_models::{Frame, RawDetection};

use crate::error::{InferError, InferResult};
use crate::jpeg::encode_jpeg;

/// Configuration for the remote backend client.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Candidate base URLs, probed in order.
    pub endpoints: Vec<String>,
    /// Base URL of a deployment that only speaks the legacy multipart
    /// contract; retried once when the primary contract fails.
    pub legacy_endpoint: Option<String>,
    /// Per-call detection timeout.
    pub detect_timeout: Duration,
    /// Health probe timeout.
    pub health_timeout: Duration,
    /// Confidence threshold forwarded to the service.
    pub confidence_threshold: f32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["http://localhost:8000".to_string()],
            legacy_endpoint: None,
            detect_timeout: Duration::from_secs(8),
            health_timeout: Duration::from_secs(3),
            confidence_threshold: 0.25,
        }
    }
}

impl RemoteConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let endpoints = std::env::var("HAZARD_API_URLS")
            .map(|s| {
                s.split(',')
                    .map(|e| e.trim().trim_end_matches('/').to_string())
                    .filter(|e| !e.is_empty())
                    .collect()
            })
            .unwrap_or_else(|_| vec!["http://localhost:8000".to_string()]);

        Self {
            endpoints,
            legacy_endpoint: std::env::var("HAZARD_API_LEGACY_URL")
                .ok()
                .map(|e| e.trim_end_matches('/').to_string()),
            detect_timeout: Duration::from_secs(
                std::env::var("HAZARD_API_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(8),
            ),
            health_timeout: Duration::from_secs(
                std::env::var("HAZARD_API_HEALTH_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3),
            ),
            confidence_threshold: std::env::var("HAZARD_API_CONFIDENCE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.25),
        }
    }
}

/// Request body for the base64 contract.
#[derive(Debug, Serialize)]
struct DetectBase64Request<'a> {
    image: &'a str,
    confidence_threshold: f32,
}

/// One detection as reported by the service.
#[derive(Debug, Clone, Deserialize)]
struct WireDetection {
    /// Corner coordinates `[x1, y1, x2, y2]` in source-frame space.
    bbox: [f32; 4],
    confidence: f32,
    class_id: u32,
}

/// Response body shared by both contracts.
#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    detections: Vec<WireDetection>,
}

/// Health check response.
#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    #[serde(default)]
    model_loaded: bool,
}

/// Client for the remote hazard-detection service.
pub struct RemoteDetector {
    http: Client,
    config: RemoteConfig,
}

impl RemoteDetector {
    /// Create a new remote client.
    pub fn new(config: RemoteConfig) -> InferResult<Self> {
        let http = Client::builder()
            .timeout(config.detect_timeout)
            .build()
            .map_err(InferError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> InferResult<Self> {
        Self::new(RemoteConfig::from_env())
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Check whether a candidate deployment is ready to serve.
    pub async fn health_check(&self, base_url: &str) -> bool {
        let url = format!("{}/health", base_url);

        let request = self.http.get(&url).timeout(self.config.health_timeout);
        match request.send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<HealthResponse>().await {
                    Ok(health) => {
                        let ready = health.status == "healthy" || health.status == "ok";
                        ready && health.model_loaded
                    }
                    Err(e) => {
                        warn!(base_url, "Health check returned malformed body: {}", e);
                        false
                    }
                }
            }
            Ok(response) => {
                warn!(base_url, status = %response.status(), "Health check failed");
                false
            }
            Err(e) => {
                debug!(base_url, "Health check error: {}", e);
                false
            }
        }
    }

    /// Probe the candidate endpoints in order; the first healthy one wins.
    pub async fn probe(&self) -> Option<String> {
        for base_url in &self.config.endpoints {
            if self.health_check(base_url).await {
                debug!(base_url, "Remote backend healthy");
                return Some(base_url.clone());
            }
        }
        None
    }

    /// Run detection against the given deployment.
    ///
    /// Tries the base64 contract first; on any failure retries once against
    /// the legacy multipart contract when one is configured. Returned boxes
    /// are in source-frame coordinates (the service maps them server-side).
    pub async fn detect(&self, base_url: &str, frame: &Frame) -> InferResult<Vec<RawDetection>> {
        let jpeg = encode_jpeg(frame)?;

        match self.detect_base64(base_url, &jpeg).await {
            Ok(detections) => Ok(detections),
            Err(e) if self.config.legacy_endpoint.is_some() => {
                let legacy = self.config.legacy_endpoint.as_deref().unwrap();
                warn!(
                    base_url,
                    legacy, "Primary contract failed, retrying legacy: {}", e
                );
                self.detect_multipart(legacy, jpeg).await
            }
            Err(e) => Err(e),
        }
    }

    /// Primary contract: JSON body with a base64 JPEG.
    async fn detect_base64(&self, base_url: &str, jpeg: &[u8]) -> InferResult<Vec<RawDetection>> {
        let url = format!("{}/detect-base64", base_url);
        let encoded = BASE64.encode(jpeg);
        let body = DetectBase64Request {
            image: &encoded,
            confidence_threshold: self.config.confidence_threshold,
        };

        let response = self
            .http
            .post(&url)
            .timeout(self.config.detect_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferError::Timeout(self.config.detect_timeout)
                } else {
                    InferError::Network(e)
                }
            })?;

        Self::parse_response(response).await
    }

    /// Legacy contract: multipart file upload.
    async fn detect_multipart(&self, base_url: &str, jpeg: Vec<u8>) -> InferResult<Vec<RawDetection>> {
        let url = format!("{}/detect", base_url);
        let part = reqwest::multipart::Part::bytes(jpeg)
            .file_name("frame.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| InferError::RequestFailed(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(&url)
            .timeout(self.config.detect_timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferError::Timeout(self.config.detect_timeout)
                } else {
                    InferError::Network(e)
                }
            })?;

        Self::parse_response(response).await
    }

    async fn parse_response(response: reqwest::Response) -> InferResult<Vec<RawDetection>> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InferError::RequestFailed(format!(
                "service returned {}: {}",
                status, body
            )));
        }

        let parsed: DetectResponse = response
            .json()
            .await
            .map_err(|e| InferError::invalid_response(e.to_string()))?;

        Ok(parsed
            .detections
            .into_iter()
            .map(|d| RawDetection::new(d.bbox, d.confidence, d.class_id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_frame() -> Frame {
        Frame::rgb8(vec![128u8; 32 * 24 * 3], 32, 24, Instant::now())
    }

    fn healthy_body() -> serde_json::Value {
        serde_json::json!({"status": "healthy", "model_loaded": true})
    }

    #[tokio::test]
    async fn test_health_check_ready() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(healthy_body()))
            .mount(&server)
            .await;

        let detector = RemoteDetector::new(RemoteConfig::default()).unwrap();
        assert!(detector.health_check(&server.uri()).await);
    }

    #[tokio::test]
    async fn test_health_check_model_not_loaded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"status": "healthy", "model_loaded": false}),
            ))
            .mount(&server)
            .await;

        let detector = RemoteDetector::new(RemoteConfig::default()).unwrap();
        assert!(!detector.health_check(&server.uri()).await);
    }

    #[tokio::test]
    async fn test_probe_picks_first_healthy() {
        let down = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&down)
            .await;

        let up = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(healthy_body()))
            .mount(&up)
            .await;

        let config = RemoteConfig {
            endpoints: vec![down.uri(), up.uri()],
            ..Default::default()
        };
        let detector = RemoteDetector::new(config).unwrap();
        assert_eq!(detector.probe().await, Some(up.uri()));
    }

    #[tokio::test]
    async fn test_detect_base64_parses_detections() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect-base64"))
            .and(body_partial_json(
                serde_json::json!({"confidence_threshold": 0.25}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "detections": [
                    {"bbox": [10.0, 20.0, 110.0, 90.0], "confidence": 0.87,
                     "class_id": 8, "class_name": "Pothole"}
                ],
                "processing_time_ms": 31.5
            })))
            .mount(&server)
            .await;

        let detector = RemoteDetector::new(RemoteConfig::default()).unwrap();
        let detections = detector.detect(&server.uri(), &test_frame()).await.unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_id, 8);
        assert!((detections[0].score - 0.87).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_detect_falls_back_to_legacy_contract() {
        let primary = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect-base64"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&primary)
            .await;

        let legacy = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "detections": [
                    {"bbox": [0.0, 0.0, 50.0, 50.0], "confidence": 0.6, "class_id": 6}
                ]
            })))
            .mount(&legacy)
            .await;

        let config = RemoteConfig {
            legacy_endpoint: Some(legacy.uri()),
            ..Default::default()
        };
        let detector = RemoteDetector::new(config).unwrap();
        let detections = detector.detect(&primary.uri(), &test_frame()).await.unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_id, 6);
    }

    #[tokio::test]
    async fn test_detect_error_without_legacy() {
        let primary = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect-base64"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&primary)
            .await;

        let detector = RemoteDetector::new(RemoteConfig::default()).unwrap();
        let err = detector
            .detect(&primary.uri(), &test_frame())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
