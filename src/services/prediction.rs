use crate::entities::prediction;
use crate::errors::ServiceError;
use crate::services::provisioning::{ensure_default_model, DEFAULT_MODEL_ID};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{error::SqlErr, ConnectionTrait, DbErr, EntityTrait, Set};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Confidence recorded when the service does not report one
pub const DEFAULT_CONFIDENCE: &str = "High";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PredictionError {
    #[error("request to prediction service failed: {0}")]
    Transport(String),

    #[error("prediction service timed out after {0:?}")]
    Timeout(Duration),

    #[error("prediction service responded with status {0}")]
    Status(u16),

    #[error("invalid prediction response: {0}")]
    InvalidResponse(String),
}

impl From<PredictionError> for ServiceError {
    fn from(err: PredictionError) -> Self {
        ServiceError::PredictionUnavailable(err.to_string())
    }
}

/// Successful answer from the prediction service
#[derive(Debug, Clone, PartialEq)]
pub struct QualityPrediction {
    pub quality_score: f64,
    pub quality_class: String,
    pub confidence: Option<String>,
    /// Everything the service returned, merged into the caller's response
    pub body: Map<String, Value>,
}

impl QualityPrediction {
    /// Requires a numeric `quality_score` and a present `quality_class`.
    pub fn from_response(body: Value) -> Result<Self, PredictionError> {
        let Value::Object(body) = body else {
            return Err(PredictionError::InvalidResponse(
                "expected a JSON object".to_string(),
            ));
        };

        let quality_score = body
            .get("quality_score")
            .and_then(Value::as_f64)
            .ok_or_else(|| {
                PredictionError::InvalidResponse("`quality_score` missing or not numeric".into())
            })?;

        let quality_class = match body.get("quality_class") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => {
                return Err(PredictionError::InvalidResponse(
                    "`quality_class` missing".into(),
                ))
            }
            Some(other) => other.to_string(),
        };

        let confidence = body
            .get("confidence")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self {
            quality_score,
            quality_class,
            confidence,
            body,
        })
    }
}

/// Source of quality predictions for a reading
#[async_trait]
pub trait QualityPredictor: Send + Sync {
    async fn predict(&self, reading: &Map<String, Value>) -> Result<QualityPrediction, PredictionError>;
}

/// Calls `POST {base_url}/predict` with the reading as the JSON body
#[derive(Clone)]
pub struct HttpQualityPredictor {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpQualityPredictor {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/predict", base_url.trim_end_matches('/')),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl QualityPredictor for HttpQualityPredictor {
    #[instrument(skip(self, reading), fields(endpoint = %self.endpoint))]
    async fn predict(&self, reading: &Map<String, Value>) -> Result<QualityPrediction, PredictionError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(reading)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PredictionError::Timeout(self.timeout)
                } else {
                    PredictionError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Prediction service rejected reading");
            return Err(PredictionError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PredictionError::InvalidResponse(e.to_string()))?;

        let prediction = QualityPrediction::from_response(body)?;
        debug!(quality_score = prediction.quality_score, "Prediction received");
        Ok(prediction)
    }
}

/// Stores the prediction unless the product already has one. Returns whether a row was written.
pub async fn persist_prediction<C: ConnectionTrait>(
    db: &C,
    product_id: i64,
    prediction: &QualityPrediction,
    predicted_at: DateTime<Utc>,
) -> Result<bool, DbErr> {
    ensure_default_model(db).await?;

    let row = prediction::ActiveModel {
        product_id: Set(product_id),
        time_predict: Set(predicted_at),
        quality_score: Set(prediction.quality_score),
        confidence: Set(prediction
            .confidence
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIDENCE.to_string())),
        quality_category: Set(prediction.quality_class.clone()),
        ai_model: Set(DEFAULT_MODEL_ID),
    };

    match prediction::Entity::insert(row).exec_without_returning(db).await {
        Ok(_) => Ok(true),
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            debug!(product_id, "Prediction already recorded");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}
