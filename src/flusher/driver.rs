//! Periodic flusher task.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use super::{FlushItem, FlushReport, Flusher, SyncOutcome};

/// Synchronise every `period` until `shutdown` resolves, then run one final
/// pass and return its report.
pub async fn run_periodic<T, F>(
    flusher: Arc<Flusher<T>>,
    period: Duration,
    shutdown: F,
) -> Option<FlushReport>
where
    T: FlushItem,
    F: Future<Output = ()> + Send,
{
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    info!(kind = T::KIND, period_ms = period.as_millis(), "Flusher started");
    loop {
        tokio::select! {
            () = &mut shutdown => break,
            _ = ticker.tick() => {
                flusher.synchronize().await;
            }
        }
    }

    let outcome = flusher.synchronize().await;
    let stats = flusher.fan_in().stats().snapshot();
    info!(
        kind = T::KIND,
        queued = stats.queued,
        dropped = stats.dropped,
        drop_rate = stats.drop_rate(),
        "Flusher stopped"
    );

    match outcome {
        SyncOutcome::Completed(report) => Some(report),
        SyncOutcome::Skipped => {
            warn!(kind = T::KIND, "Final flush skipped, another pass was still running");
            None
        }
    }
}
