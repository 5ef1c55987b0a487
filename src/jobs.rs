//! Scheduled background work: the daily window roll, the booking status
//! advance and WAL compaction. Each loop survives failed runs and stops on
//! the shutdown token.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::calendar::{local_midnight, local_today};
use crate::engine::Engine;

/// Grace added past midnight so the roll sees the new local day.
const MIDNIGHT_GRACE: Duration = Duration::from_secs(1);

/// Time from `now` until the next local midnight in `offset`.
pub fn duration_until_next_midnight(now: DateTime<Utc>, offset: FixedOffset) -> Duration {
    let tomorrow = local_today(now, offset) + chrono::Duration::days(1);
    let target = local_midnight(tomorrow, offset).with_timezone(&Utc);
    (target - now).to_std().unwrap_or(Duration::ZERO)
}

/// Roll every court's window forward once per local day, just after midnight.
pub async fn run_window_roller(engine: Arc<Engine>, shutdown: CancellationToken) {
    loop {
        let wait = duration_until_next_midnight(engine.now(), engine.offset()) + MIDNIGHT_GRACE;
        info!("next window roll in {} minutes", wait.as_secs() / 60);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                let report = engine.roll_availability_window().await;
                for (court_id, reason) in &report.failed {
                    error!("court {court_id} missed today's roll: {reason}");
                }
            }
            _ = shutdown.cancelled() => {
                info!("window roller received shutdown signal");
                return;
            }
        }
    }
}

/// Settle finished bookings every `period`.
pub async fn run_status_advancer(engine: Arc<Engine>, period: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = engine.advance_booking_statuses().await;
                if report.completed + report.cancelled > 0 {
                    info!(
                        "status advance: {} completed, {} cancelled",
                        report.completed, report.cancelled
                    );
                }
                for (court_id, reason) in &report.failed {
                    warn!("status advance failed on court {court_id}: {reason}");
                }
            }
            _ = shutdown.cancelled() => {
                info!("status advancer received shutdown signal");
                return;
            }
        }
    }
}

/// Compact the WAL whenever `threshold` appends have accumulated, checking every `period`.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, period: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let appends = engine.wal_appends_since_compact().await;
                if appends < threshold {
                    continue;
                }
                match engine.compact_wal().await {
                    Ok(()) => info!("compacted WAL after {appends} appends"),
                    Err(e) => error!("WAL compaction failed: {e}"),
                }
            }
            _ = shutdown.cancelled() => {
                debug!("compactor received shutdown signal");
                return;
            }
        }
    }
}
