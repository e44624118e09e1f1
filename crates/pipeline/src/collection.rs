//! Collection Cycle
//!
//! Timer handler that generates a fresh batch and synchronizes it.

use crate::registry::TimerHandler;
use crate::timer::TimerInfo;
use async_trait::async_trait;
use std::sync::Arc;
use storage::{SensorRepository, SyncReport, UpsertSynchronizer};
use tokio::sync::Mutex;
use tracing::{error, info, info_span, warn, Instrument};

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Committed(SyncReport),
    RolledBack,
    /// Another cycle was still applying
    Skipped,
}

/// One generate-and-sync pass per timer fire
pub struct CollectionCycle {
    synchronizer: UpsertSynchronizer,
    sensor_count: u32,
    /// Held for the duration of a cycle
    in_flight: Mutex<()>,
}

impl CollectionCycle {
    /// Create a cycle handler for `sensor_count` sensors
    pub fn new(repository: Arc<SensorRepository>, sensor_count: u32) -> Self {
        Self {
            synchronizer: UpsertSynchronizer::new(repository),
            sensor_count,
            in_flight: Mutex::new(()),
        }
    }

    /// Run one cycle; failures are logged, never propagated
    pub async fn run_cycle(&self, info: &TimerInfo) -> CycleOutcome {
        let Ok(_guard) = self.in_flight.try_lock() else {
            warn!("Previous collection cycle still applying, skipping this fire");
            metrics::counter!("sensor_sync_cycles_total", "outcome" => "skipped").increment(1);
            return CycleOutcome::Skipped;
        };

        if info.past_due {
            info!("The timer is past due ({:?} late)", info.lateness);
        }

        let batch = sensor_sim::generate(self.sensor_count);

        match self.synchronizer.sync(&batch).await {
            Ok(report) => {
                metrics::counter!("sensor_sync_cycles_total", "outcome" => "committed").increment(1);
                metrics::counter!("sensor_sync_rows_total", "operation" => "insert")
                    .increment(report.inserted as u64);
                metrics::counter!("sensor_sync_rows_total", "operation" => "update")
                    .increment(report.updated as u64);
                CycleOutcome::Committed(report)
            }
            Err(e) => {
                // The next fire retries with freshly generated readings
                error!("Collection cycle failed: {}", e);
                metrics::counter!("sensor_sync_cycles_total", "outcome" => "rolled_back").increment(1);
                CycleOutcome::RolledBack
            }
        }
    }
}

#[async_trait]
impl TimerHandler for CollectionCycle {
    async fn on_tick(&self, info: TimerInfo) {
        let span = info_span!(
            "data_collection",
            invocation_id = %info.invocation_id,
            fired_at = %info.fired_at
        );
        let outcome = self.run_cycle(&info).instrument(span).await;
        info!("data_collection finished: {:?}", outcome);
    }
}
