//! Upsert Synchronizer
//!
//! Applies one cycle's batch to the sensor table inside a single transaction.
//! Either every reading lands or none does.

use crate::changes::ChangeOperation;
use crate::repository::SensorRepository;
use sensor_sim::{Batch, SensorId};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that abort a batch
#[derive(Debug, Error)]
pub enum SyncError {
    /// Could not open the batch transaction
    #[error("Failed to open transaction: {0}")]
    Begin(#[source] sqlx::Error),

    /// A statement failed; the whole batch was rolled back
    #[error("Upsert failed for sensor {sensor_id}, batch rolled back: {source}")]
    Statement {
        sensor_id: SensorId,
        #[source]
        source: sqlx::Error,
    },

    /// Commit failed; the whole batch was rolled back
    #[error("Commit failed, batch rolled back: {0}")]
    Commit(#[source] sqlx::Error),
}

/// Outcome of a committed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub inserted: usize,
    pub updated: usize,
}

impl SyncReport {
    /// Rows changed by the batch
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Stateless batch synchronizer; all state lives in the repository
pub struct UpsertSynchronizer {
    repository: Arc<SensorRepository>,
}

impl UpsertSynchronizer {
    /// Create a synchronizer writing through the given repository
    pub fn new(repository: Arc<SensorRepository>) -> Self {
        Self { repository }
    }

    /// Apply the batch atomically
    ///
    /// Entries are independent keys, so they are applied in map order. On any
    /// failure the transaction is rolled back and no row changes.
    pub async fn sync(&self, batch: &Batch) -> Result<SyncReport, SyncError> {
        debug!("Synchronizing batch of {} readings", batch.len());

        let mut tx = self.repository.begin().await.map_err(SyncError::Begin)?;

        let mut report = SyncReport::default();
        for reading in batch.values() {
            match tx.upsert(reading).await {
                Ok(ChangeOperation::Insert) => report.inserted += 1,
                Ok(ChangeOperation::Update) => report.updated += 1,
                Err(source) => {
                    tx.rollback().await;
                    warn!("Batch rolled back at sensor {}", reading.sensor_id);
                    return Err(SyncError::Statement {
                        sensor_id: reading.sensor_id,
                        source,
                    });
                }
            }
        }

        // A failed commit drops the transaction, which rolls it back
        tx.commit().await.map_err(SyncError::Commit)?;

        info!(
            inserted = report.inserted,
            updated = report.updated,
            "Batch committed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChangeRecord, SensorRow};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use sensor_sim::{generate_with, SensorReading};
    use std::path::PathBuf;
    use uuid::Uuid;

    /// SQLite file under the temp dir, removed on drop
    struct TempDb {
        path: PathBuf,
    }

    impl Drop for TempDb {
        fn drop(&mut self) {
            for suffix in ["", "-wal", "-shm"] {
                let _ = std::fs::remove_file(format!("{}{}", self.path.display(), suffix));
            }
        }
    }

    async fn temp_repository() -> (Arc<SensorRepository>, TempDb) {
        let path = std::env::temp_dir().join(format!("sensor-sync-{}.db", Uuid::new_v4()));
        let url = format!("sqlite://{}", path.display());
        let repo = SensorRepository::connect(&url, 4).await.unwrap();
        repo.ensure_schema().await.unwrap();
        (Arc::new(repo), TempDb { path })
    }

    fn batch_of(readings: &[SensorReading]) -> Batch {
        readings.iter().map(|r| (r.sensor_id, *r)).collect()
    }

    fn rows_of(batch: &Batch) -> Vec<SensorRow> {
        batch.values().map(SensorRow::from).collect()
    }

    /// Abort any write touching `sensor_id`
    async fn inject_failure(repo: &SensorRepository, sensor_id: SensorId) {
        for event in ["INSERT", "UPDATE"] {
            let sql = format!(
                "CREATE TRIGGER fail_{event}_{sensor_id} BEFORE {event} ON LeedsSensorsData \
                 WHEN NEW.sensor_id = {sensor_id} BEGIN SELECT RAISE(ABORT, 'injected failure'); END"
            );
            sqlx::query(&sql).execute(repo.pool()).await.unwrap();
        }
    }

    async fn clear_failure(repo: &SensorRepository, sensor_id: SensorId) {
        for event in ["INSERT", "UPDATE"] {
            let sql = format!("DROP TRIGGER fail_{event}_{sensor_id}");
            sqlx::query(&sql).execute(repo.pool()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_updates_existing_and_inserts_missing() {
        let (repo, _db) = temp_repository().await;
        let sync = UpsertSynchronizer::new(repo.clone());

        sync.sync(&batch_of(&[SensorReading::new(1, 9, 16, 41, 600)]))
            .await
            .unwrap();

        let r1 = SensorReading::new(1, 14, 24, 69, 1400);
        let r2 = SensorReading::new(2, 10, 20, 55, 900);
        let report = sync.sync(&batch_of(&[r1, r2])).await.unwrap();

        assert_eq!(report, SyncReport { inserted: 1, updated: 1 });
        assert_eq!(
            repo.rows().await.unwrap(),
            vec![SensorRow::from(&r1), SensorRow::from(&r2)]
        );
    }

    #[tokio::test]
    async fn test_insert_writes_sensor_id() {
        let (repo, _db) = temp_repository().await;
        let sync = UpsertSynchronizer::new(repo.clone());

        sync.sync(&batch_of(&[SensorReading::new(42, 8, 15, 40, 500)]))
            .await
            .unwrap();

        let rows = repo.rows().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sensor_id, 42);
    }

    #[tokio::test]
    async fn test_failure_on_any_statement_leaves_table_untouched() {
        const BATCH_SIZE: u32 = 4;
        let (repo, _db) = temp_repository().await;
        let sync = UpsertSynchronizer::new(repo.clone());
        let mut rng = StdRng::seed_from_u64(1);

        sync.sync(&generate_with(&mut rng, BATCH_SIZE)).await.unwrap();
        let before = repo.rows().await.unwrap();

        for k in 1..=BATCH_SIZE {
            inject_failure(&repo, k).await;
            let mut rx = repo.changes().subscribe();

            let err = sync
                .sync(&generate_with(&mut rng, BATCH_SIZE))
                .await
                .unwrap_err();

            assert!(matches!(err, SyncError::Statement { sensor_id, .. } if sensor_id == k));
            assert_eq!(repo.rows().await.unwrap(), before, "partial write at k={}", k);
            assert!(rx.try_recv().is_err(), "notification after rollback at k={}", k);

            clear_failure(&repo, k).await;
        }
    }

    #[tokio::test]
    async fn test_failed_first_cycle_inserts_nothing() {
        let (repo, _db) = temp_repository().await;
        let sync = UpsertSynchronizer::new(repo.clone());
        inject_failure(&repo, 3).await;

        let result = sync.sync(&generate_with(&mut StdRng::seed_from_u64(2), 3)).await;

        assert!(result.is_err());
        assert_eq!(repo.row_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_uncommitted_batch_invisible_to_readers() {
        let (repo, _db) = temp_repository().await;
        let sync = UpsertSynchronizer::new(repo.clone());
        let mut rng = StdRng::seed_from_u64(3);

        sync.sync(&generate_with(&mut rng, 2)).await.unwrap();
        let before = repo.rows().await.unwrap();
        let mut rx = repo.changes().subscribe();

        let next = batch_of(&[
            SensorReading::new(1, 15, 25, 70, 1500),
            SensorReading::new(3, 8, 15, 40, 500),
        ]);
        let mut tx = repo.begin().await.unwrap();
        for reading in next.values() {
            tx.upsert(reading).await.unwrap();
        }
        assert_eq!(tx.pending(), 2);

        // Another pooled connection still sees the pre-cycle state
        assert_eq!(repo.rows().await.unwrap(), before);
        assert!(rx.try_recv().is_err());

        let committed = tx.commit().await.unwrap();
        assert_eq!(committed.len(), 2);

        let after = repo.rows().await.unwrap();
        assert_eq!(after.len(), 3);
        assert_eq!(after[0], SensorRow::from(&next[&1]));
        assert_eq!(after[2], SensorRow::from(&next[&3]));

        let notification = rx.recv().await.unwrap();
        let records: Vec<ChangeRecord> = serde_json::from_str(&notification.data).unwrap();
        assert_eq!(records[0].operation, ChangeOperation::Update);
        assert_eq!(records[1].operation, ChangeOperation::Insert);
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let (repo, _db) = temp_repository().await;

        {
            let mut tx = repo.begin().await.unwrap();
            tx.upsert(&SensorReading::new(1, 10, 20, 50, 700)).await.unwrap();
        }

        assert_eq!(repo.row_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_two_cycles_insert_then_update() {
        let (repo, _db) = temp_repository().await;
        let sync = UpsertSynchronizer::new(repo.clone());
        let mut rng = StdRng::seed_from_u64(4);

        let first = generate_with(&mut rng, 3);
        let report = sync.sync(&first).await.unwrap();
        assert_eq!(report, SyncReport { inserted: 3, updated: 0 });
        assert_eq!(repo.rows().await.unwrap(), rows_of(&first));

        let second = generate_with(&mut rng, 3);
        let report = sync.sync(&second).await.unwrap();
        assert_eq!(report, SyncReport { inserted: 0, updated: 3 });
        assert_eq!(repo.row_count().await.unwrap(), 3);
        assert_eq!(repo.rows().await.unwrap(), rows_of(&second));
    }

    #[tokio::test]
    async fn test_empty_batch_commits_nothing() {
        let (repo, _db) = temp_repository().await;
        let sync = UpsertSynchronizer::new(repo.clone());
        let mut rx = repo.changes().subscribe();

        let report = sync.sync(&Batch::new()).await.unwrap();

        assert_eq!(report.total(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_commit_failure_leaves_table_untouched() {
        let (repo, _db) = temp_repository().await;
        let sync = UpsertSynchronizer::new(repo.clone());
        let mut rng = StdRng::seed_from_u64(5);

        sync.sync(&generate_with(&mut rng, 3)).await.unwrap();
        let before = repo.rows().await.unwrap();

        // Deferred foreign keys are only checked at COMMIT
        for sql in [
            "CREATE TABLE audit_parent (id INTEGER PRIMARY KEY)",
            "CREATE TABLE audit_child (parent_id INTEGER \
             REFERENCES audit_parent(id) DEFERRABLE INITIALLY DEFERRED)",
            "CREATE TRIGGER audit_dangling AFTER UPDATE ON LeedsSensorsData \
             WHEN NEW.sensor_id = 2 BEGIN INSERT INTO audit_child VALUES (999); END",
        ] {
            sqlx::query(sql).execute(repo.pool()).await.unwrap();
        }
        let mut rx = repo.changes().subscribe();

        let err = sync.sync(&generate_with(&mut rng, 3)).await.unwrap_err();

        assert!(matches!(err, SyncError::Commit(_)));
        assert_eq!(repo.rows().await.unwrap(), before);
        assert!(rx.try_recv().is_err());
    }
}
