//! Pure threshold evaluation over a reading and its prediction.

use crate::entities::alert_setting;
use crate::services::attributes::coerce_number;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdRule {
    pub metric: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub enabled: bool,
}

impl From<alert_setting::Model> for ThresholdRule {
    fn from(setting: alert_setting::Model) -> Self {
        Self {
            metric: setting.metric,
            min: setting.min_value,
            max: setting.max_value,
            enabled: setting.enabled,
        }
    }
}

impl ThresholdRule {
    pub fn is_breached_by(&self, value: f64) -> bool {
        self.min.is_some_and(|min| value < min) || self.max.is_some_and(|max| value > max)
    }
}

/// A rule that fired, ready to become an alert
#[derive(Debug, Clone, PartialEq)]
pub struct Breach {
    pub metric: String,
    pub value: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Breach {
    pub fn title(&self) -> String {
        format!("{} Alert", self.metric)
    }

    pub fn description(&self) -> String {
        let min = self.min.map_or_else(|| "-inf".to_string(), |v| v.to_string());
        let max = self.max.map_or_else(|| "inf".to_string(), |v| v.to_string());
        format!(
            "{} value {} is out of range [{}, {}]",
            self.metric, self.value, min, max
        )
    }
}

/// Looks in the raw reading first and the prediction second.
pub fn resolve_metric<'a>(
    metric: &str,
    reading: &'a Map<String, Value>,
    prediction: &'a Map<String, Value>,
) -> Option<&'a Value> {
    reading
        .get(metric)
        .filter(|value| !value.is_null())
        .or_else(|| prediction.get(metric))
}

/// Every enabled rule whose metric resolves to an out-of-range number.
pub fn evaluate(
    rules: &[ThresholdRule],
    reading: &Map<String, Value>,
    prediction: &Map<String, Value>,
) -> Vec<Breach> {
    rules
        .iter()
        .filter(|rule| rule.enabled)
        .filter_map(|rule| {
            let value = resolve_metric(&rule.metric, reading, prediction).and_then(coerce_number)?;
            rule.is_breached_by(value).then(|| Breach {
                metric: rule.metric.clone(),
                value,
                min: rule.min,
                max: rule.max,
            })
        })
        .collect()
}
