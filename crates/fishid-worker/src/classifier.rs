//! Classification capability.
//!
//! The worker treats the classifier as opaque: image bytes in, a label and a
//! confidence out. The production binding is an HTTP inference service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub type ClassifierResult<T> = Result<T, ClassifierError>;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Classifier unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClassifierError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClassifierError::ServiceUnavailable(_) | ClassifierError::Network(_)
        )
    }
}

/// Classifier output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f64,
}

impl Classification {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Image classifier.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, image: &[u8]) -> ClassifierResult<Classification>;
}

/// Configuration for the HTTP classifier.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Base URL of the inference service
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries for retryable failures
    pub max_retries: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
        }
    }
}

impl ClassifierConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("CLASSIFIER_URL")
                .unwrap_or_else(|_| "http://localhost:8001".to_string()),
            timeout: Duration::from_secs(
                std::env::var("CLASSIFIER_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            max_retries: std::env::var("CLASSIFIER_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// Client for an HTTP inference service.
///
/// `POST {base_url}/classify` with the raw image as the body; the service
/// answers `{"label": ..., "confidence": ...}`.
pub struct HttpClassifier {
    http: Client,
    config: ClassifierConfig,
}

impl HttpClassifier {
    pub fn new(config: ClassifierConfig) -> ClassifierResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ClassifierError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> ClassifierResult<Self> {
        Self::new(ClassifierConfig::from_env())
    }

    /// Check if the inference service is healthy.
    pub async fn health_check(&self) -> ClassifierResult<bool> {
        let url = format!("{}/health", self.config.base_url);

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response.json().await?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("Classifier health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Classifier health check error: {}", e);
                Ok(false)
            }
        }
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> ClassifierResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = ClassifierResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "Classifier request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, image: &[u8]) -> ClassifierResult<Classification> {
        let url = format!("{}/classify", self.config.base_url);
        debug!(bytes = image.len(), "Sending classification request to {}", url);

        let response = self
            .with_retry(|| async {
                let response = self
                    .http
                    .post(&url)
                    .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                    .body(image.to_vec())
                    .send()
                    .await?;
                if response.status().is_server_error() {
                    return Err(ClassifierError::ServiceUnavailable(format!(
                        "classifier returned {}",
                        response.status()
                    )));
                }
                Ok(response)
            })
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::RequestFailed(format!(
                "classifier returned {}: {}",
                status, body
            )));
        }

        let body = response.text().await?;
        let classification: Classification = serde_json::from_str(&body)
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;
        Ok(classification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> ClassifierConfig {
        ClassifierConfig {
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
            max_retries: 1,
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = ClassifierConfig::default();
        assert_eq!(config.base_url, "http://localhost:8001");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_classify_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/classify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "label": "Sparus aurata",
                "confidence": 0.87
            })))
            .mount(&server)
            .await;

        let classifier = HttpClassifier::new(config(&server)).unwrap();
        let result = classifier.classify(&[1, 2, 3]).await.unwrap();
        assert_eq!(result, Classification::new("Sparus aurata", 0.87));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_then_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/classify"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let classifier = HttpClassifier::new(config(&server)).unwrap();
        let err = classifier.classify(&[1]).await.unwrap_err();
        assert!(matches!(err, ClassifierError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_garbage_response_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/classify"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let classifier = HttpClassifier::new(config(&server)).unwrap();
        let err = classifier.classify(&[1]).await.unwrap_err();
        assert!(matches!(err, ClassifierError::InvalidResponse(_)));
    }
}
