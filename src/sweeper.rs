use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::metrics::{SWEEP_EVICTIONS, TRACKED_IDENTITIES};
use crate::rate_limit::LimiterState;

// Evicts idle clients every `period` until `shutdown` fires.
pub(crate) fn spawn_sweeper(
    state: Arc<LimiterState>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    // Anchor the schedule at spawn time, not at the task's first poll.
    let first = Instant::now() + period;

    tokio::spawn(async move {
        let mut ticker = interval_at(first, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(?period, "rate limit sweeper started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("rate limit sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let report = state.sweep_at(Instant::now());
                    SWEEP_EVICTIONS.inc_by(report.evicted as f64);
                    TRACKED_IDENTITIES.set(report.remaining as f64);

                    if report.evicted > 0 {
                        debug!(
                            evicted = report.evicted,
                            remaining = report.remaining,
                            "evicted idle clients"
                        );
                    }
                }
            }
        }
    })
}
