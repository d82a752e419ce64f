use crate::entities::{alert, alert_setting};
use crate::errors::ServiceError;
use crate::events::{AlertPayload, LiveEvent, LiveHub};
use crate::services::readings::{find_reading, ReadingRecord};
use crate::services::thresholds::{Breach, ThresholdRule};
use crate::tracing::{log_swallowed, ErrorKind};
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

/// How many alerts the inbox shows
pub const ALERT_INBOX_LIMIT: u64 = 50;

/// Desired state of one metric's threshold
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Validate, ToSchema)]
#[validate(schema(function = "validate_bounds"))]
pub struct SettingInput {
    #[validate(length(min = 1, max = 64))]
    #[schema(example = "pH")]
    pub metric: String,
    #[schema(example = 2.8)]
    pub min: Option<f64>,
    #[schema(example = 3.8)]
    pub max: Option<f64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

fn validate_bounds(setting: &SettingInput) -> Result<(), ValidationError> {
    if let (Some(min), Some(max)) = (setting.min, setting.max) {
        if min > max {
            let mut err = ValidationError::new("bounds");
            err.message = Some("min must not exceed max".into());
            return Err(err);
        }
    }
    Ok(())
}

/// An alert with the reading it points at, when there is one
#[derive(Debug, Clone, Serialize)]
pub struct AlertDetails {
    #[serde(flatten)]
    pub alert: alert::Model,
    pub reading: Option<ReadingRecord>,
}

/// Publishes without letting delivery problems reach the caller. Returns whether anyone received it.
pub fn publish_best_effort(live: &LiveHub, warehouse_id: i32, event: LiveEvent) -> bool {
    match live.publish(warehouse_id, event) {
        Ok(receivers) => receivers > 0,
        Err(err) => {
            debug!(warehouse_id, error = %err, "Live event not delivered");
            false
        }
    }
}

/// Alert records and per-warehouse threshold settings
#[derive(Clone)]
pub struct AlertService {
    db: Arc<DatabaseConnection>,
    live: Arc<LiveHub>,
}

impl AlertService {
    pub fn new(db: Arc<DatabaseConnection>, live: Arc<LiveHub>) -> Self {
        Self { db, live }
    }

    pub async fn load_rules(&self, warehouse_id: i32) -> Result<Vec<ThresholdRule>, ServiceError> {
        Ok(self
            .settings(warehouse_id)
            .await?
            .into_iter()
            .map(ThresholdRule::from)
            .collect())
    }

    /// Stores one alert per breach and announces each on the warehouse topic.
    /// A breach whose alert cannot be stored is logged and skipped; the
    /// returned list holds only the alerts actually written.
    #[instrument(skip(self, breaches), fields(count = breaches.len()))]
    pub async fn raise_breaches(
        &self,
        warehouse_id: i32,
        product_id: i64,
        breaches: &[Breach],
    ) -> Vec<alert::Model> {
        let mut created = Vec::with_capacity(breaches.len());
        for breach in breaches {
            let alert = match self
                .insert_alert(warehouse_id, Some(product_id), breach.title(), breach.description())
                .await
            {
                Ok(alert) => alert,
                Err(err) => {
                    log_swallowed(&err, ErrorKind::Database, "persist_alert");
                    continue;
                }
            };
            publish_best_effort(
                &self.live,
                warehouse_id,
                LiveEvent::AlertNew(AlertPayload::from(&alert)),
            );
            created.push(alert);
        }
        if !created.is_empty() {
            info!(warehouse_id, product_id, count = created.len(), "Threshold alerts raised");
        }
        created
    }

    /// Manual announcement from a dashboard user
    pub async fn announce(
        &self,
        warehouse_id: i32,
        title: String,
        description: String,
        product_id: Option<i64>,
    ) -> Result<alert::Model, ServiceError> {
        let alert = self
            .insert_alert(warehouse_id, product_id, title, description)
            .await?;
        publish_best_effort(
            &self.live,
            warehouse_id,
            LiveEvent::NewAlert(AlertPayload::from(&alert)),
        );
        Ok(alert)
    }

    async fn insert_alert(
        &self,
        warehouse_id: i32,
        product_id: Option<i64>,
        title: String,
        description: String,
    ) -> Result<alert::Model, ServiceError> {
        let row = alert::ActiveModel {
            warehouse_id: Set(warehouse_id),
            product_id: Set(product_id),
            title: Set(title),
            description: Set(description),
            is_read: Set(false),
            ..Default::default()
        };
        Ok(row.insert(&*self.db).await?)
    }

    /// Newest alerts first, plus the warehouse's unread count
    pub async fn inbox(&self, warehouse_id: i32) -> Result<(Vec<alert::Model>, u64), ServiceError> {
        let alerts = alert::Entity::find()
            .filter(alert::Column::WarehouseId.eq(warehouse_id))
            .order_by_desc(alert::Column::CreatedAt)
            .order_by_desc(alert::Column::AlertId)
            .limit(ALERT_INBOX_LIMIT)
            .all(&*self.db)
            .await?;

        let unread = alert::Entity::find()
            .filter(alert::Column::WarehouseId.eq(warehouse_id))
            .filter(alert::Column::IsRead.eq(false))
            .count(&*self.db)
            .await?;

        Ok((alerts, unread))
    }

    /// Marks one alert, or every alert of the warehouse when `alert_id` is absent.
    pub async fn mark_read(
        &self,
        warehouse_id: i32,
        alert_id: Option<i32>,
    ) -> Result<u64, ServiceError> {
        let mut update = alert::Entity::update_many()
            .col_expr(alert::Column::IsRead, Expr::value(true))
            .filter(alert::Column::WarehouseId.eq(warehouse_id));
        if let Some(alert_id) = alert_id {
            update = update.filter(alert::Column::AlertId.eq(alert_id));
        }
        let result = update.exec(&*self.db).await?;
        Ok(result.rows_affected)
    }

    pub async fn delete_read(&self, warehouse_id: i32) -> Result<u64, ServiceError> {
        let result = alert::Entity::delete_many()
            .filter(alert::Column::WarehouseId.eq(warehouse_id))
            .filter(alert::Column::IsRead.eq(true))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn delete(&self, warehouse_id: i32, alert_id: i32) -> Result<(), ServiceError> {
        let result = alert::Entity::delete_many()
            .filter(alert::Column::WarehouseId.eq(warehouse_id))
            .filter(alert::Column::AlertId.eq(alert_id))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Alert {} not found", alert_id)));
        }
        Ok(())
    }

    pub async fn details(
        &self,
        warehouse_id: i32,
        alert_id: i32,
    ) -> Result<AlertDetails, ServiceError> {
        let alert = alert::Entity::find_by_id(alert_id)
            .filter(alert::Column::WarehouseId.eq(warehouse_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Alert {} not found", alert_id)))?;

        let reading = match alert.product_id {
            Some(product_id) => find_reading(&*self.db, product_id).await?,
            None => None,
        };

        Ok(AlertDetails { alert, reading })
    }

    pub async fn settings(
        &self,
        warehouse_id: i32,
    ) -> Result<Vec<alert_setting::Model>, ServiceError> {
        Ok(alert_setting::Entity::find()
            .filter(alert_setting::Column::WarehouseId.eq(warehouse_id))
            .order_by_asc(alert_setting::Column::Metric)
            .all(&*self.db)
            .await?)
    }

    /// Upserts every setting on `(warehouse_id, metric)` in one transaction.
    #[instrument(skip(self, settings), fields(count = settings.len()))]
    pub async fn upsert_settings(
        &self,
        warehouse_id: i32,
        settings: Vec<SettingInput>,
    ) -> Result<Vec<alert_setting::Model>, ServiceError> {
        for setting in &settings {
            setting.validate()?;
        }

        let txn = self.db.begin().await?;
        for setting in settings {
            let row = alert_setting::ActiveModel {
                warehouse_id: Set(warehouse_id),
                metric: Set(setting.metric),
                min_value: Set(setting.min),
                max_value: Set(setting.max),
                enabled: Set(setting.enabled),
                ..Default::default()
            };
            alert_setting::Entity::insert(row)
                .on_conflict(
                    OnConflict::columns([
                        alert_setting::Column::WarehouseId,
                        alert_setting::Column::Metric,
                    ])
                    .update_columns([
                        alert_setting::Column::MinValue,
                        alert_setting::Column::MaxValue,
                        alert_setting::Column::Enabled,
                    ])
                    .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;
        }
        txn.commit().await?;

        self.settings(warehouse_id).await
    }

    pub async fn delete_setting(&self, warehouse_id: i32, metric: &str) -> Result<(), ServiceError> {
        let result = alert_setting::Entity::delete_many()
            .filter(alert_setting::Column::WarehouseId.eq(warehouse_id))
            .filter(alert_setting::Column::Metric.eq(metric))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "No alert setting for metric {}",
                metric
            )));
        }
        Ok(())
    }
}
