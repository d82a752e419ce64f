use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

/// Alert fields pushed to dashboards
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<i32>,
    pub title: String,
    pub description: String,
    pub product_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<&crate::entities::alert::Model> for AlertPayload {
    fn from(alert: &crate::entities::alert::Model) -> Self {
        Self {
            alert_id: Some(alert.alert_id),
            title: alert.title.clone(),
            description: alert.description.clone(),
            product_id: alert.product_id,
            created_at: alert.created_at,
        }
    }
}

/// Events delivered on a warehouse topic, framed as `{"event": .., "data": ..}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum LiveEvent {
    /// Merged raw and predicted reading with the server timestamp
    SensorUpdate(serde_json::Value),
    /// Raised by threshold evaluation
    AlertNew(AlertPayload),
    /// Raised by a manual announcement
    NewAlert(AlertPayload),
}

impl LiveEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LiveEvent::SensorUpdate(_) => "sensor_update",
            LiveEvent::AlertNew(_) => "alert_new",
            LiveEvent::NewAlert(_) => "new_alert",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PublishError {
    #[error("no active subscribers on {0}")]
    NoSubscribers(String),
}

/// Topic name for a warehouse's live channel
pub fn warehouse_topic(warehouse_id: i32) -> String {
    format!("warehouse_{}", warehouse_id)
}

/// Per-warehouse fan-out of live events. Topics are created on first use.
#[derive(Debug)]
pub struct LiveHub {
    topics: DashMap<String, broadcast::Sender<LiveEvent>>,
    capacity: usize,
}

impl LiveHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    fn sender(&self, topic: String) -> broadcast::Sender<LiveEvent> {
        self.topics
            .entry(topic)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    pub fn subscribe(&self, warehouse_id: i32) -> broadcast::Receiver<LiveEvent> {
        let topic = warehouse_topic(warehouse_id);
        debug!(topic = %topic, "Live subscriber joined");
        self.sender(topic).subscribe()
    }

    /// Returns how many subscribers received the event.
    pub fn publish(&self, warehouse_id: i32, event: LiveEvent) -> Result<usize, PublishError> {
        let topic = warehouse_topic(warehouse_id);
        let sender = self.sender(topic.clone());
        let name = event.name();
        match sender.send(event) {
            Ok(receivers) => {
                debug!(topic = %topic, event = name, receivers, "Published live event");
                Ok(receivers)
            }
            Err(_) => Err(PublishError::NoSubscribers(topic)),
        }
    }
}
