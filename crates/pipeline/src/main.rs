//! Sensor Sync - Main Entry Point

use pipeline::{build_registry, init_logging, init_metrics, PipelineConfig};
use std::sync::Arc;
use storage::SensorRepository;
use tracing::info;

/// Config file looked up when `SENSOR_SYNC_CONFIG` is unset
const DEFAULT_CONFIG_FILE: &str = "sensor-sync";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_file = std::env::var("SENSOR_SYNC_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    let config = PipelineConfig::load(&config_file)?;
    init_logging(&config)?;

    info!("=== Sensor Sync v{} ===", env!("CARGO_PKG_VERSION"));
    init_metrics(&config)?;

    let repository = Arc::new(SensorRepository::connect(&config.database_url, config.max_connections).await?);
    repository.ensure_schema().await?;

    let host = build_registry(&config, repository.clone()).start(repository.changes());
    info!(
        "Simulating {} sensors every {}s, {} functions running",
        config.sensor_count,
        config.interval_secs,
        host.function_count()
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    host.shutdown().await;
    repository.close().await;
    info!("Sensor Sync stopped");
    Ok(())
}
