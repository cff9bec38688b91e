use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::collaborators::{ModelRuntime, OutcomeStore};
use crate::learning::AdaptiveLearningController;

/// Run `perform_online_learning` every `interval` until `shutdown` flips to
/// `true` or its sender is dropped.
///
/// The first sweep runs one full interval after spawn. A slow sweep delays the
/// next tick instead of stacking sweeps.
pub fn spawn_learning_sweep<M, S>(
    controller: Arc<AdaptiveLearningController<M, S>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    M: ModelRuntime + 'static,
    S: OutcomeStore + 'static,
{
    tokio::spawn(async move {
        let period = interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_ms = period.as_millis() as u64, "Learning sweep started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = controller.perform_online_learning().await;
                    tracing::debug!(
                        models = report.results.len(),
                        updated = report.updated(),
                        "Learning sweep tick"
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Learning sweep stopped");
    })
}
