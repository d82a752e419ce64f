//! Runs one inbound reading through the pipeline.
//!
//! Provisioning and storage share one transaction. The prediction call
//! happens after that transaction commits, so a failed prediction leaves the
//! stored reading in place. Alerting and live publication run last and never
//! change the outcome reported to the caller.

use crate::errors::ServiceError;
use crate::events::{LiveEvent, LiveHub};
use crate::services::alerts::{publish_best_effort, AlertService};
use crate::services::prediction::{
    persist_prediction, PredictionError, QualityPrediction, QualityPredictor,
};
use crate::services::provisioning::ensure_production_entities;
use crate::services::readings::{store_reading, Reading};
use crate::services::thresholds::evaluate;
use crate::tracing::{log_swallowed, ErrorKind};
use chrono::{DateTime, SecondsFormat, Utc};
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Pipeline stages, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Received,
    Provisioned,
    Stored,
    Predicted,
    Evaluated,
    Published,
}

/// Result of a successful ingestion
#[derive(Debug, Clone)]
pub struct IngestionOutcome {
    /// `{...input, ...prediction, timestamp}` as returned to the caller
    pub reading: Value,
    /// False when this product already had a prediction
    pub prediction_recorded: bool,
    pub alerts_raised: usize,
    /// Whether the sensor update reached at least one live subscriber
    pub notified: bool,
}

/// Merges the caller's reading with the prediction and stamps it.
pub fn merge_reading(
    reading: &Map<String, Value>,
    prediction: &Map<String, Value>,
    at: DateTime<Utc>,
) -> Value {
    let mut merged = reading.clone();
    merged.extend(prediction.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged.insert(
        "timestamp".to_string(),
        Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    Value::Object(merged)
}

#[derive(Clone)]
pub struct IngestionService {
    db: Arc<DatabaseConnection>,
    predictor: Arc<dyn QualityPredictor>,
    alerts: AlertService,
    live: Arc<LiveHub>,
    prediction_timeout: Duration,
    default_warehouse_id: i32,
}

impl IngestionService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        predictor: Arc<dyn QualityPredictor>,
        alerts: AlertService,
        live: Arc<LiveHub>,
        prediction_timeout: Duration,
        default_warehouse_id: i32,
    ) -> Self {
        Self {
            db,
            predictor,
            alerts,
            live,
            prediction_timeout,
            default_warehouse_id,
        }
    }

    #[instrument(skip(self, body))]
    pub async fn ingest(&self, body: Value) -> Result<IngestionOutcome, ServiceError> {
        let reading = Reading::from_payload(body, self.default_warehouse_id)?;
        let warehouse_id = reading.keys.warehouse_id;
        let product_id = reading.product_id;
        debug!(stage = %Stage::Received, warehouse_id, product_id, "Reading accepted");

        self.store(&reading).await?;

        let prediction = self.predict(&reading).await?;
        let predicted_at = Utc::now();
        let prediction_recorded =
            persist_prediction(&*self.db, product_id, &prediction, predicted_at).await?;
        debug!(stage = %Stage::Predicted, product_id, prediction_recorded, "Prediction stored");

        let alerts_raised = self.raise_alerts(&reading, &prediction).await;
        debug!(stage = %Stage::Evaluated, product_id, alerts_raised, "Thresholds evaluated");

        let merged = merge_reading(&reading.payload, &prediction.body, predicted_at);
        let notified = publish_best_effort(
            &self.live,
            warehouse_id,
            LiveEvent::SensorUpdate(merged.clone()),
        );
        debug!(stage = %Stage::Published, product_id, notified, "Sensor update published");

        info!(
            warehouse_id,
            product_id,
            quality_score = prediction.quality_score,
            alerts_raised,
            "Reading ingested"
        );

        Ok(IngestionOutcome {
            reading: merged,
            prediction_recorded,
            alerts_raised,
            notified,
        })
    }

    /// Provisions and stores in one all-or-nothing transaction.
    async fn store(&self, reading: &Reading) -> Result<u64, ServiceError> {
        let txn = self.db.begin().await?;

        let result: Result<u64, ServiceError> = async {
            ensure_production_entities(&txn, reading.keys).await?;
            debug!(stage = %Stage::Provisioned, product_id = reading.product_id);
            store_reading(&txn, reading).await
        }
        .await;

        match result {
            Ok(written) => {
                txn.commit().await?;
                debug!(stage = %Stage::Stored, product_id = reading.product_id, measures = written);
                Ok(written)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    error!(error = %rollback_err, "Rollback failed");
                }
                warn!(product_id = reading.product_id, error = %err, "Reading not stored");
                Err(err)
            }
        }
    }

    async fn predict(&self, reading: &Reading) -> Result<QualityPrediction, ServiceError> {
        let call = self.predictor.predict(&reading.payload);
        let result = match tokio::time::timeout(self.prediction_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(PredictionError::Timeout(self.prediction_timeout)),
        };

        result.map_err(|err| {
            warn!(product_id = reading.product_id, error = %err, "Prediction unavailable");
            ServiceError::from(err)
        })
    }

    async fn raise_alerts(&self, reading: &Reading, prediction: &QualityPrediction) -> usize {
        let warehouse_id = reading.keys.warehouse_id;
        let rules = match self.alerts.load_rules(warehouse_id).await {
            Ok(rules) => rules,
            Err(err) => {
                log_swallowed(&err, ErrorKind::Database, "load_alert_settings");
                return 0;
            }
        };

        let breaches = evaluate(&rules, &reading.payload, &prediction.body);
        if breaches.is_empty() {
            return 0;
        }

        self.alerts
            .raise_breaches(warehouse_id, reading.product_id, &breaches)
            .await
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prediction_fields_override_input_and_timestamp_is_added() {
        let reading = json!({"pH": 3.1, "line_id": 1, "quality_score": "stale"});
        let prediction = json!({"quality_score": 6.5, "quality_class": 1});
        let at = "2024-05-01T10:00:00Z".parse::<DateTime<Utc>>().unwrap();

        let merged = merge_reading(
            reading.as_object().unwrap(),
            prediction.as_object().unwrap(),
            at,
        );

        assert_eq!(merged["pH"], json!(3.1));
        assert_eq!(merged["quality_score"], json!(6.5));
        assert_eq!(merged["quality_class"], json!(1));
        assert_eq!(merged["timestamp"], "2024-05-01T10:00:00.000Z");
    }

    #[test]
    fn stages_render_in_snake_case() {
        assert_eq!(Stage::Provisioned.to_string(), "provisioned");
    }
}
