//! Ensures the warehouse, line, sensor and batch rows a reading refers to.
//!
//! Every write is a single insert-if-absent statement keyed on the primary
//! key, so concurrent readings for the same keys cannot duplicate rows or
//! fail on each other. MySQL has no `DO NOTHING`; there the statements
//! become `ON DUPLICATE KEY UPDATE <pk> = <pk>`.

use crate::entities::{ai_model, batch, line, sensor, warehouse};
use crate::services::attributes::{sensor_id, Attribute};
use chrono::Utc;
use sea_orm::{sea_query::OnConflict, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, Set};
use tracing::instrument;

/// Category given to warehouses created by the ingestion path
pub const DEFAULT_WAREHOUSE_CATEGORY: &str = "Main Production";
pub const DEFAULT_MODEL_ID: i32 = 1;
pub const DEFAULT_MODEL_VERSION: &str = "v1.0";

/// Identifiers that locate a reading on the production floor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductionKeys {
    pub warehouse_id: i32,
    pub line_id: i64,
    pub batch_id: i64,
}

/// Conflict clause that leaves an existing row with the same key untouched
fn keep_existing<C: ColumnTrait>(key: C) -> OnConflict {
    OnConflict::column(key).do_nothing_on([key]).to_owned()
}

#[instrument(skip(db))]
pub async fn ensure_production_entities<C: ConnectionTrait>(
    db: &C,
    keys: ProductionKeys,
) -> Result<(), DbErr> {
    ensure_warehouse(db, keys.warehouse_id).await?;
    ensure_line(db, keys.line_id, keys.warehouse_id).await?;
    ensure_sensors(db, keys.line_id).await?;
    ensure_batch(db, keys.batch_id, keys.line_id).await
}

pub async fn ensure_warehouse<C: ConnectionTrait>(db: &C, warehouse_id: i32) -> Result<(), DbErr> {
    let row = warehouse::ActiveModel {
        warehouse_id: Set(warehouse_id),
        categories: Set(Some(DEFAULT_WAREHOUSE_CATEGORY.to_string())),
        ..Default::default()
    };
    warehouse::Entity::insert(row)
        .on_conflict(keep_existing(warehouse::Column::WarehouseId))
        .exec_without_returning(db)
        .await?;
    Ok(())
}

pub async fn ensure_line<C: ConnectionTrait>(
    db: &C,
    line_id: i64,
    warehouse_id: i32,
) -> Result<(), DbErr> {
    let row = line::ActiveModel {
        line_id: Set(line_id),
        warehouse_id: Set(warehouse_id),
    };
    line::Entity::insert(row)
        .on_conflict(keep_existing(line::Column::LineId))
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Ensures all eleven sensors of a line exist, whichever attributes the reading carries.
pub async fn ensure_sensors<C: ConnectionTrait>(db: &C, line_id: i64) -> Result<(), DbErr> {
    let rows = Attribute::all().map(|attribute| sensor::ActiveModel {
        sensor_id: Set(sensor_id(line_id, attribute)),
        model: Set(attribute.sensor_model()),
        unit: Set(attribute.unit().to_string()),
        line_id: Set(line_id),
    });
    sensor::Entity::insert_many(rows)
        .on_conflict(keep_existing(sensor::Column::SensorId))
        .exec_without_returning(db)
        .await?;
    Ok(())
}

pub async fn ensure_batch<C: ConnectionTrait>(
    db: &C,
    batch_id: i64,
    line_id: i64,
) -> Result<(), DbErr> {
    let row = batch::ActiveModel {
        batch_id: Set(batch_id),
        line_id: Set(line_id),
        quantity: Set(0),
        produced_date: Set(Some(Utc::now())),
    };
    batch::Entity::insert(row)
        .on_conflict(keep_existing(batch::Column::BatchId))
        .exec_without_returning(db)
        .await?;
    Ok(())
}

pub async fn ensure_default_model<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    let row = ai_model::ActiveModel {
        model_id: Set(DEFAULT_MODEL_ID),
        version: Set(DEFAULT_MODEL_VERSION.to_string()),
    };
    ai_model::Entity::insert(row)
        .on_conflict(keep_existing(ai_model::Column::ModelId))
        .exec_without_returning(db)
        .await?;
    Ok(())
}
