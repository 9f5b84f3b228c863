use std::path::Path;
use std::sync::Arc;

use tracing::info;

use bayline::config::Config;
use bayline::directory::{load_seed, Directory, RepairTaskCatalog};
use bayline::engine::Engine;
use bayline::notify::NotifyHub;
use bayline::reaper;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    bayline::observability::init(config.metrics_port);

    std::fs::create_dir_all(&config.data_dir)?;

    let catalog = Arc::new(RepairTaskCatalog::new());
    let directory = Arc::new(Directory::new());
    if let Ok(seed_path) = std::env::var("BAYLINE_SEED_FILE") {
        load_seed(Path::new(&seed_path), &catalog, &directory)?;
        info!("loaded seed data from {seed_path}");
    }

    let notify = Arc::new(NotifyHub::new());
    let wal_path = config.data_dir.join("bayline.wal");
    let engine = Arc::new(Engine::new(
        &config,
        catalog.clone(),
        wal_path.clone(),
        notify,
    )?);

    info!("bayline scheduling engine started");
    info!("  spots: {}", config.max_spots);
    info!(
        "  hours: {:02}:{:02}-{:02}:{:02}",
        config.opening_minutes / 60,
        config.opening_minutes % 60,
        config.closing_minutes / 60,
        config.closing_minutes % 60
    );
    info!("  wal: {}", wal_path.display());
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!(
                "http://0.0.0.0:{p}/metrics"
            ))
    );

    let sweep = tokio::spawn(reaper::run_sweep(
        engine.clone(),
        config.sweep_frequency_minutes,
    ));
    let lock_reaper = tokio::spawn(reaper::run_lock_reaper(engine.clone()));
    let compactor = tokio::spawn(reaper::run_compactor(
        engine.clone(),
        config.compact_threshold,
    ));

    // Run until SIGTERM/ctrl-c. Every mutation fsyncs through the WAL before
    // it is applied, so there is nothing to flush on the way out.
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
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

    info!("shutdown signal received");
    // Safe to cut the background loops short: every mutation is WAL-durable
    // before it applies.
    sweep.abort();
    lock_reaper.abort();
    compactor.abort();

    info!("bayline stopped");
    Ok(())
}
