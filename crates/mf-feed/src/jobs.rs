//! Periodic background tasks.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Runs `tick` every `period` until `shutdown` flips to `true` or its
/// sender is dropped. A slow tick delays the next one rather than causing
/// a burst of catch-up runs.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    run_at_start: bool,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        if *shutdown.borrow() {
            return;
        }
        if run_at_start {
            tick().await;
        }

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick completes immediately
        interval.tick().await;

        tracing::info!(job = name, period_secs = period.as_secs_f64(), "background job started");
        loop {
            tokio::select! {
                _ = interval.tick() => tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!(job = name, "background job stopped");
    })
}
