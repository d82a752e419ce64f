//! The eleven measured wine attributes, in the fixed order that sensor ids
//! are derived from.

use crate::entities::product;
use strum::IntoEnumIterator;

/// Sensor ids reserve this many slots per line.
pub const SENSOR_ID_STRIDE: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter, strum::EnumCount)]
pub enum Attribute {
    FixedAcidity,
    VolatileAcidity,
    CitricAcid,
    ResidualSugar,
    Chlorides,
    FreeSulfurDioxide,
    TotalSulfurDioxide,
    Density,
    Ph,
    Sulphates,
    Alcohol,
}

impl Attribute {
    /// Iterates attributes in ordinal order.
    pub fn all() -> impl Iterator<Item = Attribute> {
        Attribute::iter()
    }

    /// Zero-based position in the fixed order
    pub fn index(self) -> usize {
        self as usize
    }

    /// Payload key as sent by the line simulator
    pub fn label(self) -> &'static str {
        match self {
            Attribute::FixedAcidity => "fixed acidity",
            Attribute::VolatileAcidity => "volatile acidity",
            Attribute::CitricAcid => "citric acid",
            Attribute::ResidualSugar => "residual sugar",
            Attribute::Chlorides => "chlorides",
            Attribute::FreeSulfurDioxide => "free sulfur dioxide",
            Attribute::TotalSulfurDioxide => "total sulfur dioxide",
            Attribute::Density => "density",
            Attribute::Ph => "pH",
            Attribute::Sulphates => "sulphates",
            Attribute::Alcohol => "alcohol",
        }
    }

    pub fn column(self) -> product::Column {
        match self {
            Attribute::FixedAcidity => product::Column::FixedAcidity,
            Attribute::VolatileAcidity => product::Column::VolatileAcidity,
            Attribute::CitricAcid => product::Column::CitricAcid,
            Attribute::ResidualSugar => product::Column::ResidualSugar,
            Attribute::Chlorides => product::Column::Chlorides,
            Attribute::FreeSulfurDioxide => product::Column::FreeSulfurDioxide,
            Attribute::TotalSulfurDioxide => product::Column::TotalSulfurDioxide,
            Attribute::Density => product::Column::Density,
            Attribute::Ph => product::Column::Ph,
            Attribute::Sulphates => product::Column::Sulphates,
            Attribute::Alcohol => product::Column::Alcohol,
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Attribute::FreeSulfurDioxide | Attribute::TotalSulfurDioxide => "mg/dm^3",
            Attribute::Density => "g/cm^3",
            Attribute::Ph => "pH",
            Attribute::Alcohol => "% vol",
            _ => "g/dm^3",
        }
    }

    pub fn sensor_model(self) -> String {
        format!("Sensor-{}", self.label())
    }

    /// Reads this attribute's stored value back from a product row.
    pub fn value_of(self, product: &product::Model) -> Option<f64> {
        match self {
            Attribute::FixedAcidity => product.fixed_acidity,
            Attribute::VolatileAcidity => product.volatile_acidity,
            Attribute::CitricAcid => product.citric_acid,
            Attribute::ResidualSugar => product.residual_sugar,
            Attribute::Chlorides => product.chlorides,
            Attribute::FreeSulfurDioxide => product.free_sulfur_dioxide,
            Attribute::TotalSulfurDioxide => product.total_sulfur_dioxide,
            Attribute::Density => product.density,
            Attribute::Ph => product.ph,
            Attribute::Sulphates => product.sulphates,
            Attribute::Alcohol => product.alcohol,
        }
    }
}

/// Numbers and numeric strings become `f64`; anything else is not a measurement.
pub fn coerce_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Deterministic sensor id for an attribute on a line: `line_id * 1000 + (index + 1)`.
pub fn sensor_id(line_id: i64, attribute: Attribute) -> i64 {
    line_id * SENSOR_ID_STRIDE + attribute.index() as i64 + 1
}
