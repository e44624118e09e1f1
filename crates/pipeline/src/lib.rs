//! Sensor Sync Host
//!
//! Wires the collection cycle to an interval timer and the change reactor to
//! the storage change feed, plus logging, metrics and configuration.

mod collection;
mod config;
mod registry;
mod timer;

pub use crate::config::{ConfigError, LogFormat, PipelineConfig};
pub use collection::{CollectionCycle, CycleOutcome};
pub use registry::{ChangeHandler, Host, TimerHandler, TriggerRegistry};
pub use timer::{is_past_due, TimerInfo, TimerTrigger};

use change_reactor::ChangeReactor;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::sync::Arc;
use storage::SensorRepository;
use tracing::info;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::FmtSubscriber;

/// Initialize logging
pub fn init_logging(config: &PipelineConfig) -> Result<(), SetGlobalDefaultError> {
    // validate() has already checked the level
    let level = config.level().unwrap_or(tracing::Level::INFO);
    let builder = FmtSubscriber::builder().with_max_level(level).with_target(true);

    match config.log_format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    }
}

/// Install the Prometheus exporter when a listen address is configured
pub fn init_metrics(config: &PipelineConfig) -> Result<(), BuildError> {
    if let Some(addr) = config.metrics_addr {
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!("Prometheus metrics on {}", addr);
    }
    Ok(())
}

/// Register every function the host runs
pub fn build_registry(config: &PipelineConfig, repository: Arc<SensorRepository>) -> TriggerRegistry {
    let trigger = TimerTrigger::new(config.interval(), config.run_on_startup);

    TriggerRegistry::new()
        .timer(
            "data_collection",
            trigger,
            Arc::new(CollectionCycle::new(repository, config.sensor_count)),
        )
        .change("stats", Arc::new(ChangeReactor::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use storage::{ChangeNotification, ChangeOperation, ChangeRecord};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    struct Forward(mpsc::UnboundedSender<ChangeNotification>);

    impl ChangeHandler for Forward {
        fn on_change(&self, event: &ChangeNotification) {
            let _ = self.0.send(event.clone());
        }
    }

    #[tokio::test]
    async fn test_registry_binds_both_functions() {
        let repo = Arc::new(SensorRepository::from_pool(
            sqlx::sqlite::SqlitePoolOptions::new()
                .connect_lazy("sqlite::memory:")
                .unwrap(),
        ));
        let registry = build_registry(&PipelineConfig::default(), repo);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_cycles_flow_through_to_change_handler() {
        let path: PathBuf = std::env::temp_dir().join(format!("sensor-host-{}.db", Uuid::new_v4()));
        let repo = Arc::new(
            SensorRepository::connect(&format!("sqlite://{}", path.display()), 2)
                .await
                .unwrap(),
        );
        repo.ensure_schema().await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let host = TriggerRegistry::new()
            .timer(
                "data_collection",
                TimerTrigger::new(Duration::from_millis(50), true),
                Arc::new(CollectionCycle::new(repo.clone(), 3)),
            )
            .change("stats", Arc::new(Forward(tx)))
            .start(repo.changes());

        let mut operations = Vec::new();
        for _ in 0..2 {
            let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .unwrap()
                .unwrap();
            let records: Vec<ChangeRecord> = serde_json::from_str(&event.data).unwrap();
            assert_eq!(records.len(), 3);
            operations.push(records[0].operation);
        }
        host.shutdown().await;

        assert_eq!(operations, vec![ChangeOperation::Insert, ChangeOperation::Update]);
        assert_eq!(repo.row_count().await.unwrap(), 3);

        repo.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }
}
