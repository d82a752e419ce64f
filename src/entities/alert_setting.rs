use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Threshold rule for one metric in one warehouse. A `None` bound is unbounded.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "alert_settings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub setting_id: i32,
    pub warehouse_id: i32,
    pub metric: String,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub enabled: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
