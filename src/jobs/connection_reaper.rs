use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::app::realtime::{ReapReport, SubscriptionRegistry};

/// Periodically evicts connections whose client vanished without
/// unsubscribing. Returns when `shutdown` is cancelled.
pub async fn run(
    registry: Arc<SubscriptionRegistry>,
    reap_interval: Duration,
    idle_timeout: Duration,
    shutdown: CancellationToken,
) {
    info!(
        interval_secs = reap_interval.as_secs(),
        idle_timeout_secs = idle_timeout.as_secs(),
        "connection reaper started"
    );

    let start = tokio::time::Instant::now() + reap_interval;
    let mut ticker = tokio::time::interval_at(start, reap_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("connection reaper stopped");
                return;
            }
            _ = ticker.tick() => {
                sweep(&registry, idle_timeout);
            }
        }
    }
}

pub fn sweep(registry: &SubscriptionRegistry, idle_timeout: Duration) -> ReapReport {
    let report = registry.reap(idle_timeout);
    if report.total() > 0 {
        let stats = registry.stats();
        info!(
            idle = report.idle,
            cancelled = report.cancelled,
            remaining_devices = stats.devices,
            "reaped connections"
        );
    } else {
        debug!("reaper sweep found nothing to evict");
    }
    report
}
