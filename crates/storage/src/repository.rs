//! Repository Implementation

use crate::changes::{ChangeFeed, ChangeOperation, ChangeRecord};
use crate::schema::{self, SensorRow};
use crate::StorageError;
use sensor_sim::SensorReading;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long a statement waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Repository for the sensor table
pub struct SensorRepository {
    /// Connection pool
    pool: SqlitePool,
    /// Committed change notifications
    feed: ChangeFeed,
}

impl SensorRepository {
    /// Connect to an SQLite database, creating the file if missing
    ///
    /// # Arguments
    /// * `database_url` - e.g. `sqlite://sensors.db` or `sqlite::memory:`
    /// * `max_connections` - pool size
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StorageError::InvalidUrl(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        info!("Connected to sensor database (pool size {})", max_connections);
        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            feed: ChangeFeed::default(),
        }
    }

    /// Create the sensor table if it does not exist
    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        sqlx::query(schema::CREATE_TABLE).execute(&self.pool).await?;
        debug!("Sensor table ready");
        Ok(())
    }

    /// Open a transaction scoped to one batch
    pub async fn begin(&self) -> Result<UpsertTransaction, sqlx::Error> {
        let tx = self.pool.begin().await?;
        Ok(UpsertTransaction {
            tx,
            changes: Vec::new(),
            feed: self.feed.clone(),
        })
    }

    /// All committed rows ordered by sensor id
    pub async fn rows(&self) -> Result<Vec<SensorRow>, StorageError> {
        let rows = sqlx::query_as::<_, SensorRow>(schema::SELECT_ROWS)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Number of committed rows
    pub async fn row_count(&self) -> Result<i64, StorageError> {
        let (count,): (i64,) = sqlx::query_as(schema::COUNT_ROWS).fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// Feed of committed changes
    pub fn changes(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close all pooled connections
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// An open batch transaction
///
/// Dropping it without calling [`commit`](Self::commit) rolls back every
/// statement issued through it.
pub struct UpsertTransaction {
    tx: Transaction<'static, Sqlite>,
    changes: Vec<ChangeRecord>,
    feed: ChangeFeed,
}

impl UpsertTransaction {
    /// Update the row for this sensor if it exists, otherwise insert it
    pub async fn upsert(&mut self, reading: &SensorReading) -> Result<ChangeOperation, sqlx::Error> {
        let exists = sqlx::query(schema::ROW_EXISTS)
            .bind(reading.sensor_id)
            .fetch_optional(&mut *self.tx)
            .await?
            .is_some();

        let (statement, operation) = if exists {
            (schema::UPDATE_ROW, ChangeOperation::Update)
        } else {
            (schema::INSERT_ROW, ChangeOperation::Insert)
        };

        sqlx::query(statement)
            .bind(reading.sensor_id)
            .bind(reading.temperature)
            .bind(reading.wind)
            .bind(reading.relative_humidity)
            .bind(reading.co2)
            .execute(&mut *self.tx)
            .await?;

        self.changes.push(ChangeRecord {
            operation,
            item: SensorRow::from(reading),
        });
        Ok(operation)
    }

    /// Number of statements applied but not yet committed
    pub fn pending(&self) -> usize {
        self.changes.len()
    }

    /// Commit the batch, then publish its changes
    pub async fn commit(self) -> Result<Vec<ChangeRecord>, sqlx::Error> {
        self.tx.commit().await?;
        self.feed.publish(&self.changes);
        Ok(self.changes)
    }

    /// Discard every statement issued in this transaction
    pub async fn rollback(self) {
        let discarded = self.changes.len();
        match self.tx.rollback().await {
            Ok(()) => debug!("Rolled back {} pending statements", discarded),
            // The connection drops the transaction on release anyway
            Err(e) => warn!("Rollback failed: {}", e),
        }
    }
}
