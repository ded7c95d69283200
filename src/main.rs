use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use circulate::audit::PromotionLog;
use circulate::catalog::{Catalog, MemoryCatalog, ResourceMeta};
use circulate::clock::SystemClock;
use circulate::engine::Engine;
use circulate::sweep;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("CIRCULATE_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    circulate::observability::init(metrics_port);

    let data_dir = std::env::var("CIRCULATE_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let compact_threshold: u64 = std::env::var("CIRCULATE_COMPACT_THRESHOLD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);

    // Ensure data directory exists
    std::fs::create_dir_all(&data_dir)?;
    let data_dir = PathBuf::from(data_dir);

    let catalog = Arc::new(MemoryCatalog::new());
    if let Ok(path) = std::env::var("CIRCULATE_CATALOG_FILE") {
        let data = std::fs::read_to_string(&path)?;
        let entries: Vec<ResourceMeta> = serde_json::from_str(&data)?;
        for meta in entries {
            catalog.add(meta);
        }
        info!("loaded {} catalog entries from {path}", catalog.len());
    }

    let engine = Arc::new(Engine::new(
        data_dir.join("bookings.wal"),
        catalog.clone() as Arc<dyn Catalog>,
        Arc::new(SystemClock),
    )?);

    // The sweep's audit sink is core to data correctness; failing to open
    // it aborts startup.
    let audit = Arc::new(PromotionLog::open(data_dir.join("promotions"))?);

    info!("circulate starting");
    info!("  data_dir: {}", data_dir.display());
    info!("  compact_threshold: {compact_threshold}");
    info!(
        "  metrics: {}",
        metrics_port.map_or("disabled".to_string(), |p| format!(
            "http://0.0.0.0:{p}/metrics"
        ))
    );

    // Startup catch-up run, in case the daily trigger was missed while down
    let report = sweep::run_promotion_sweep(&engine, &audit).await;
    info!(
        "startup sweep: {} promoted, {} failed",
        report.promoted(),
        report.failed()
    );

    tokio::spawn(sweep::run_sweep_scheduler(engine.clone(), audit.clone()));
    tokio::spawn(sweep::run_compactor(engine.clone(), compact_threshold));

    // Run until SIGTERM/ctrl-c
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    shutdown.await;

    info!("circulate stopped");
    Ok(())
}
