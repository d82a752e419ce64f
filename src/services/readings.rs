use crate::entities::{batch, measure, prediction, product};
use crate::errors::ServiceError;
use crate::services::attributes::{coerce_number, sensor_id, Attribute};
use crate::services::provisioning::ProductionKeys;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, Insert, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

/// A validated inbound reading. `payload` keeps the caller's object as sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub keys: ProductionKeys,
    pub product_id: i64,
    pub wine_type: Option<String>,
    pub values: Vec<(Attribute, f64)>,
    pub payload: Map<String, Value>,
}

fn integer_field(payload: &Map<String, Value>, key: &str) -> Result<Option<i64>, ServiceError> {
    let invalid = || ServiceError::ValidationError(format!("`{}` must be an integer", key));
    match payload.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| {
                n.as_f64()
                    .filter(|v| v.fract() == 0.0 && v.abs() < i64::MAX as f64)
                    .map(|v| v as i64)
            })
            .map(Some)
            .ok_or_else(invalid),
        Some(Value::String(s)) => s.trim().parse::<i64>().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

fn required_integer(payload: &Map<String, Value>, key: &str) -> Result<i64, ServiceError> {
    integer_field(payload, key)?
        .ok_or_else(|| ServiceError::ValidationError(format!("`{}` is required", key)))
}

impl Reading {
    /// Validates a raw JSON body. Nothing is written when this fails.
    pub fn from_payload(body: Value, default_warehouse_id: i32) -> Result<Self, ServiceError> {
        let Value::Object(payload) = body else {
            return Err(ServiceError::ValidationError(
                "reading must be a JSON object".to_string(),
            ));
        };

        let line_id = required_integer(&payload, "line_id")?;
        let batch_id = required_integer(&payload, "batch_id")?;
        let product_id = required_integer(&payload, "product_id")?;
        let warehouse_id = match integer_field(&payload, "warehouse_id")? {
            Some(id) => i32::try_from(id).map_err(|_| {
                ServiceError::ValidationError("`warehouse_id` is out of range".to_string())
            })?,
            None => default_warehouse_id,
        };

        let wine_type = match payload.get("type") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                return Err(ServiceError::ValidationError(
                    "`type` must be a string".to_string(),
                ))
            }
        };

        let mut values = Vec::new();
        for attribute in Attribute::all() {
            match payload.get(attribute.label()) {
                None | Some(Value::Null) => {}
                Some(raw) => {
                    let value = coerce_number(raw).ok_or_else(|| {
                        ServiceError::ValidationError(format!(
                            "`{}` must be numeric",
                            attribute.label()
                        ))
                    })?;
                    values.push((attribute, value));
                }
            }
        }

        Ok(Self {
            keys: ProductionKeys {
                warehouse_id,
                line_id,
                batch_id,
            },
            product_id,
            wine_type,
            values,
            payload,
        })
    }

    fn product_row(&self) -> product::ActiveModel {
        let mut row = product::ActiveModel {
            product_id: Set(self.product_id),
            batch_id: Set(self.keys.batch_id),
            warehouse_id: Set(self.keys.warehouse_id),
            line_id: Set(self.keys.line_id),
            wine_type: Set(self.wine_type.clone()),
            ..Default::default()
        };
        for (attribute, value) in &self.values {
            row.set(attribute.column(), Some(*value).into());
        }
        row
    }

    /// Plain insert; a second reading with the same product id must fail.
    fn product_insert(&self) -> Insert<product::ActiveModel> {
        product::Entity::insert(self.product_row())
    }

    fn measures_insert(&self) -> Option<Insert<measure::ActiveModel>> {
        if self.values.is_empty() {
            return None;
        }
        let measures = self.values.iter().map(|(attribute, value)| measure::ActiveModel {
            product_id: Set(self.product_id),
            sensor_id: Set(sensor_id(self.keys.line_id, *attribute)),
            value: Set(*value),
        });
        Some(
            measure::Entity::insert_many(measures).on_conflict(
                OnConflict::columns([measure::Column::ProductId, measure::Column::SensorId])
                    .do_nothing_on([measure::Column::ProductId, measure::Column::SensorId])
                    .to_owned(),
            ),
        )
    }
}

/// Records the product, bumps its batch counter and writes one measure per
/// present attribute. Call inside the ingestion transaction.
#[instrument(skip(db, reading), fields(product_id = reading.product_id, batch_id = reading.keys.batch_id))]
pub async fn store_reading<C: ConnectionTrait>(
    db: &C,
    reading: &Reading,
) -> Result<u64, ServiceError> {
    reading
        .product_insert()
        .exec_without_returning(db)
        .await
        .map_err(|err| {
            ServiceError::from_write_error(err, || {
                format!("Product {} has already been recorded", reading.product_id)
            })
        })?;

    batch::Entity::update_many()
        .col_expr(
            batch::Column::Quantity,
            Expr::col(batch::Column::Quantity).add(1),
        )
        .filter(batch::Column::BatchId.eq(reading.keys.batch_id))
        .exec(db)
        .await?;

    let Some(measures) = reading.measures_insert() else {
        return Ok(0);
    };
    let written = measures.exec_without_returning(db).await?;

    debug!(written, "Measures recorded");
    Ok(written)
}

/// A stored product and its prediction, keyed the way the simulator sends them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingRecord {
    pub product_id: i64,
    pub batch_id: i64,
    pub line_id: i64,
    pub warehouse_id: i32,
    #[serde(rename = "type")]
    pub wine_type: Option<String>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
    pub quality_score: Option<f64>,
    pub quality_class: Option<String>,
    pub confidence: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl ReadingRecord {
    pub fn from_rows(product: product::Model, prediction: Option<prediction::Model>) -> Self {
        let attributes = Attribute::all()
            .filter_map(|attribute| {
                attribute
                    .value_of(&product)
                    .map(|value| (attribute.label().to_string(), Value::from(value)))
            })
            .collect();

        Self {
            product_id: product.product_id,
            batch_id: product.batch_id,
            line_id: product.line_id,
            warehouse_id: product.warehouse_id,
            wine_type: product.wine_type,
            attributes,
            quality_score: prediction.as_ref().map(|p| p.quality_score),
            quality_class: prediction.as_ref().map(|p| p.quality_category.clone()),
            confidence: prediction.as_ref().map(|p| p.confidence.clone()),
            timestamp: prediction.map(|p| p.time_predict),
        }
    }
}

/// Most recently predicted readings first; readings without a prediction sort last.
pub async fn recent_readings<C: ConnectionTrait>(
    db: &C,
    warehouse_id: Option<i32>,
    limit: u64,
) -> Result<Vec<ReadingRecord>, DbErr> {
    let mut query = product::Entity::find().find_also_related(prediction::Entity);
    if let Some(warehouse_id) = warehouse_id {
        query = query.filter(product::Column::WarehouseId.eq(warehouse_id));
    }

    let rows = query
        .order_by_desc(prediction::Column::TimePredict)
        .order_by_desc(product::Column::ProductId)
        .limit(limit)
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(product, prediction)| ReadingRecord::from_rows(product, prediction))
        .collect())
}

pub async fn find_reading<C: ConnectionTrait>(
    db: &C,
    product_id: i64,
) -> Result<Option<ReadingRecord>, DbErr> {
    Ok(product::Entity::find_by_id(product_id)
        .find_also_related(prediction::Entity)
        .one(db)
        .await?
        .map(|(product, prediction)| ReadingRecord::from_rows(product, prediction)))
}
