//! Reactor Implementation

use std::sync::atomic::{AtomicU64, Ordering};
use storage::{ChangeNotification, ChangeRecord};
use thiserror::Error;
use tracing::{error, info};

/// Errors while decoding a change payload
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload is not a JSON sequence of change records
    #[error("Malformed change payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Payload decoded to zero records
    #[error("Change payload contains no records")]
    Empty,
}

/// Counters of handled notifications
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReactorStats {
    pub processed: u64,
    pub dropped: u64,
}

/// Logs every committed change it is handed
#[derive(Debug, Default)]
pub struct ChangeReactor {
    processed: AtomicU64,
    dropped: AtomicU64,
}

impl ChangeReactor {
    /// Create a new reactor
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle one notification; a malformed payload is logged and dropped
    pub fn on_change(&self, event: &ChangeNotification) {
        info!("Change notification {} received for {}", event.id, event.table);

        match self.handle(event) {
            Ok(records) => {
                self.processed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("change_reactor_events_total", "result" => "processed").increment(1);
                info!("Processed {} row changes from {}", records.len(), event.id);
            }
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("change_reactor_events_total", "result" => "dropped").increment(1);
                error!("Dropping change notification {}: {}", event.id, e);
            }
        }
    }

    /// Decode and log the payload
    pub fn handle(&self, event: &ChangeNotification) -> Result<Vec<ChangeRecord>, DecodeError> {
        let records: Vec<ChangeRecord> = serde_json::from_str(&event.data)?;
        if records.is_empty() {
            return Err(DecodeError::Empty);
        }

        for record in &records {
            let row = &record.item;
            info!(
                operation = ?record.operation,
                sensor_id = row.sensor_id,
                temperature = row.temperature,
                wind = row.wind,
                relative_humidity = row.relative_humidity,
                co2 = row.co2,
                "Sensor row changed"
            );
        }

        Ok(records)
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> ReactorStats {
        ReactorStats {
            processed: self.processed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
