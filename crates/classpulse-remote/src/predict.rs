//! HTTP risk prediction service client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;

use classpulse_core::error::PredictError;
use classpulse_core::traits::{PredictRequest, Prediction, RiskPredictor, ServiceHealth};

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Client for the risk prediction service.
pub struct HttpPredictor {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpPredictor {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Self {
        let timeout = timeout.unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            client,
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> PredictError {
        if e.is_timeout() {
            PredictError::Timeout(self.timeout)
        } else {
            PredictError::Network(e.to_string())
        }
    }
}

#[derive(Deserialize)]
struct PredictResponse {
    risk_score: Option<f64>,
    #[serde(default)]
    risk_level: Option<String>,
    #[serde(default)]
    is_at_risk: Option<bool>,
    #[serde(default)]
    probability: Option<f64>,
    #[serde(default)]
    intervention: Option<Intervention>,
}

#[derive(Deserialize, Default)]
struct Intervention {
    #[serde(default)]
    suggestions: Vec<String>,
}

#[async_trait]
impl RiskPredictor for HttpPredictor {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self, request), fields(student = %request.student_id))]
    async fn predict(&self, request: &PredictRequest) -> Result<Prediction, PredictError> {
        let response = self
            .client
            .post(format!("{}/predict", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status().as_u16();
        if status >= 400 {
            let message = response.text().await.unwrap_or_default();
            return Err(PredictError::Api { status, message });
        }

        let body: PredictResponse = response
            .json()
            .await
            .map_err(|e| PredictError::Malformed(e.to_string()))?;

        let risk_score = body
            .risk_score
            .ok_or_else(|| PredictError::Malformed("response missing risk_score".into()))?;

        Ok(Prediction {
            risk_score: risk_score.clamp(0.0, 100.0).round() as u8,
            risk_level: body.risk_level,
            is_at_risk: body.is_at_risk,
            probability: body.probability,
            suggestions: body.intervention.unwrap_or_default().suggestions,
        })
    }

    async fn health(&self) -> Result<ServiceHealth, PredictError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status().as_u16();
        if status >= 400 {
            let message = response.text().await.unwrap_or_default();
            return Err(PredictError::Api { status, message });
        }

        response
            .json()
            .await
            .map_err(|e| PredictError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> PredictRequest {
        PredictRequest {
            student_id: "s1".into(),
            grade_level: 11,
            average_score: 52.0,
            completion_rate: 38.0,
            courses: vec![],
        }
    }

    #[tokio::test]
    async fn successful_prediction() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predict"))
            .and(body_partial_json(serde_json::json!({"studentId": "s1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "risk_score": 67.4,
                "risk_level": "Moderate Risk",
                "is_at_risk": true,
                "probability": 0.74,
                "intervention": {"suggestions": ["Assign a peer mentor"]}
            })))
            .mount(&server)
            .await;

        let predictor = HttpPredictor::new(&server.uri(), None);
        let prediction = predictor.predict(&request()).await.unwrap();
        assert_eq!(prediction.risk_score, 67);
        assert_eq!(prediction.risk_level.as_deref(), Some("Moderate Risk"));
        assert_eq!(prediction.is_at_risk, Some(true));
        assert_eq!(prediction.suggestions, vec!["Assign a peer mentor"]);
    }

    #[tokio::test]
    async fn minimal_response_needs_only_a_score() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predict"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"risk_score": 12})),
            )
            .mount(&server)
            .await;

        let predictor = HttpPredictor::new(&server.uri(), None);
        let prediction = predictor.predict(&request()).await.unwrap();
        assert_eq!(prediction.risk_score, 12);
        assert!(prediction.risk_level.is_none());
        assert!(prediction.suggestions.is_empty());
    }

    #[tokio::test]
    async fn missing_score_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predict"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"risk_level": "Low"})),
            )
            .mount(&server)
            .await;

        let predictor = HttpPredictor::new(&server.uri(), None);
        let err = predictor.predict(&request()).await.unwrap_err();
        assert!(matches!(err, PredictError::Malformed(_)));
    }

    #[tokio::test]
    async fn error_status_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predict"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model exploded"))
            .mount(&server)
            .await;

        let predictor = HttpPredictor::new(&server.uri(), None);
        let err = predictor.predict(&request()).await.unwrap_err();
        match err {
            PredictError::Api { status, message } => {
                assert_eq!(status, 500);
                assert!(message.contains("model exploded"));
            }
            other => panic!("expected Api error, got {other}"),
        }
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predict"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"risk_score": 1}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let predictor = HttpPredictor::new(&server.uri(), Some(Duration::from_millis(100)));
        let err = predictor.predict(&request()).await.unwrap_err();
        assert!(matches!(err, PredictError::Timeout(_)));
        assert!(err.to_string().contains("100ms"));
    }

    #[tokio::test]
    async fn health_reports_model_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "healthy",
                "model_loaded": false
            })))
            .mount(&server)
            .await;

        let predictor = HttpPredictor::new(&server.uri(), None);
        let health = predictor.health().await.unwrap();
        assert_eq!(health.status, "healthy");
        assert!(!health.is_available());
    }
}
