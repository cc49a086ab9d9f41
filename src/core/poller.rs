use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use unidl_core::core::events::EventEmitter;

use crate::core::backend::JobApi;
use crate::core::tracker::Tracker;

/// Polls `GET /api/progress/{id}` for every unfinished job while the push
/// channel is down. Stops with the tracker.
pub fn spawn<E: EventEmitter>(
    tracker: &Tracker<E>,
    api: Arc<dyn JobApi>,
    connected: watch::Receiver<bool>,
    interval: Duration,
) -> JoinHandle<()> {
    let tracker = tracker.detached();
    let shutdown = tracker.shutdown_token();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if *connected.borrow() {
                continue;
            }
            for task_id in tracker.pending_task_ids().await {
                match api.progress(&task_id).await {
                    Ok(update) => tracker.feed(update),
                    Err(e) => tracing::debug!("[poll] {}: {:#}", task_id, e),
                }
            }
        }
        tracing::debug!("[poll] stopped");
    })
}
