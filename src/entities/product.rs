use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A single production unit and its measured attributes.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "product")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub product_id: i64,
    pub batch_id: i64,
    pub warehouse_id: i32,
    pub line_id: i64,
    #[sea_orm(column_name = "type")]
    pub wine_type: Option<String>,
    pub fixed_acidity: Option<f64>,
    pub volatile_acidity: Option<f64>,
    pub citric_acid: Option<f64>,
    pub residual_sugar: Option<f64>,
    pub chlorides: Option<f64>,
    pub free_sulfur_dioxide: Option<f64>,
    pub total_sulfur_dioxide: Option<f64>,
    pub density: Option<f64>,
    pub ph: Option<f64>,
    pub sulphates: Option<f64>,
    pub alcohol: Option<f64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::batch::Entity",
        from = "Column::BatchId",
        to = "super::batch::Column::BatchId"
    )]
    Batch,
    #[sea_orm(has_many = "super::measure::Entity")]
    Measures,
    #[sea_orm(has_one = "super::prediction::Entity")]
    Prediction,
}

impl Related<super::batch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Batch.def()
    }
}

impl Related<super::measure::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Measures.def()
    }
}

impl Related<super::prediction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Prediction.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
