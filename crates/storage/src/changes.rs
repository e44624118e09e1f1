//! Change Notifications
//!
//! After a batch commits, the repository publishes one notification describing
//! every row it inserted or updated. Receivers see only committed state.

use crate::schema::{SensorRow, SENSOR_TABLE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error};
use uuid::Uuid;

/// Default number of notifications buffered per receiver
const DEFAULT_FEED_CAPACITY: usize = 64;

/// Kind of row mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeOperation {
    Insert,
    Update,
}

/// One mutated row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChangeRecord {
    pub operation: ChangeOperation,
    pub item: SensorRow,
}

/// Envelope delivered to change subscribers
///
/// `data` holds the JSON text of a sequence of [`ChangeRecord`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub id: Uuid,
    pub table: String,
    pub event_time: DateTime<Utc>,
    pub data: String,
}

impl ChangeNotification {
    /// Encode a set of committed changes
    pub fn encode(records: &[ChangeRecord]) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::new_v4(),
            table: SENSOR_TABLE.to_string(),
            event_time: Utc::now(),
            data: serde_json::to_string(records)?,
        })
    }
}

/// Broadcast channel for committed changes
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeNotification>,
}

impl ChangeFeed {
    /// Create a feed buffering `capacity` notifications per receiver
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to notifications published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.tx.subscribe()
    }

    /// Publish committed changes; no-op for an empty set
    pub fn publish(&self, records: &[ChangeRecord]) {
        if records.is_empty() {
            return;
        }

        let notification = match ChangeNotification::encode(records) {
            Ok(n) => n,
            Err(e) => {
                error!("Failed to encode change notification: {}", e);
                return;
            }
        };

        let id = notification.id;
        match self.tx.send(notification) {
            Ok(receivers) => debug!("Published change {} ({} rows) to {} receivers", id, records.len(), receivers),
            Err(_) => debug!("No change subscribers, dropped notification {}", id),
        }
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}
