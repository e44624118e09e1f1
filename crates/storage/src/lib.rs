//! Storage Layer
//!
//! SQLite persistence for the current reading of every sensor, with an
//! all-or-nothing batch upsert and a feed of committed changes.

mod changes;
mod repository;
mod schema;
mod synchronizer;

pub use changes::{ChangeFeed, ChangeNotification, ChangeOperation, ChangeRecord};
pub use repository::{SensorRepository, UpsertTransaction};
pub use schema::{SensorRow, SENSOR_TABLE};
pub use synchronizer::{SyncError, SyncReport, UpsertSynchronizer};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Invalid connection string: {0}")]
    InvalidUrl(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::DatabaseError(err.to_string())
    }
}
