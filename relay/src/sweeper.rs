use crate::relay::Relay;
use log::*;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Starts the periodic expiry sweep for `relay`.
///
/// The first pass runs one `sweep_interval` after start. Abort the returned
/// handle to stop sweeping.
pub fn spawn(relay: Arc<Relay>) -> JoinHandle<()> {
    let period = relay.config().sweep_interval;
    info!(
        "Starting expiry sweep every {}s (record ttl {}s)",
        period.as_secs(),
        relay.config().record_ttl.as_secs()
    );

    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let report = relay.sweep_expired();
            if report.total() > 0 {
                info!(
                    "Expiry sweep removed {} record(s), {} frontend record(s), {} stale waiter(s)",
                    report.expired_records, report.expired_frontend, report.stale_waiters
                );
            } else {
                trace!("Expiry sweep found nothing to remove");
            }
        }
    })
}
