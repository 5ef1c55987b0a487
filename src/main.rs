use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use courtbook::config::Config;
use courtbook::engine::{Engine, EngineSettings};
use courtbook::jobs;
use courtbook::notify::NotifyHub;

/// How often the compactor checks the WAL append count.
const COMPACT_CHECK_PERIOD: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    courtbook::observability::init(config.metrics_port)?;
    let offset = config.offset()?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let notify = Arc::new(NotifyHub::new());
    let settings = EngineSettings::new(offset, config.window_days);
    let engine = Arc::new(Engine::new(config.wal_path(), notify, settings)?);

    info!("courtbook started");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  utc offset: {offset}");
    info!("  window: {} day(s)", config.window_days);
    info!("  venues: {}, courts: {}", engine.venue_ids().len(), engine.court_ids().len());
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let shutdown_token = CancellationToken::new();
    let tasks = vec![
        tokio::spawn(jobs::run_window_roller(engine.clone(), shutdown_token.clone())),
        tokio::spawn(jobs::run_status_advancer(
            engine.clone(),
            config.status_interval,
            shutdown_token.clone(),
        )),
        tokio::spawn(jobs::run_compactor(
            engine.clone(),
            config.compact_threshold,
            COMPACT_CHECK_PERIOD,
            shutdown_token.clone(),
        )),
    ];

    // Graceful shutdown on SIGTERM/ctrl-c
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    info!("shutdown signal received, stopping jobs");
    shutdown_token.cancel();
    for task in tasks {
        let _ = task.await;
    }

    if let Err(e) = engine.compact_wal().await {
        tracing::warn!("final compaction failed: {e}");
    }
    info!("courtbook stopped");
    Ok(())
}
