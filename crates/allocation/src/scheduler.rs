//! Background reallocation sweep. A single Tokio task ticks on a fixed
//! interval, walks every running experiment and asks the optimizer to
//! reallocate. Failures are logged and retried on the next tick; shutdown
//! is signalled through a watch channel so a sweep in progress finishes
//! its current experiment before the task exits.

use crate::optimizer::AllocationOptimizer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uplift_core::types::ExperimentStatus;
use uplift_store::ExperimentStore;

pub struct AllocationScheduler {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl AllocationScheduler {
    /// Spawn the sweep task.
    pub fn spawn(
        optimizer: Arc<AllocationOptimizer>,
        experiments: Arc<dyn ExperimentStore>,
        tick: Duration,
    ) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            info!(tick_secs = tick.as_secs_f64(), "allocation scheduler started");
            let mut ticker = tokio::time::interval(tick);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        sweep(&optimizer, experiments.as_ref());
                    }
                    _ = shutdown_rx.changed() => {
                        info!("allocation scheduler stopping");
                        break;
                    }
                }
            }
        });

        Self { handle, shutdown }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

fn sweep(optimizer: &AllocationOptimizer, experiments: &dyn ExperimentStore) {
    let running = match experiments.list_by_status(ExperimentStatus::Running) {
        Ok(running) => running,
        Err(error) => {
            warn!(error = %error, "failed to list running experiments");
            return;
        }
    };

    for experiment in running {
        match optimizer.reallocate(experiment.id) {
            Ok(Some(snapshot)) => {
                info!(
                    experiment_id = %experiment.id,
                    variants = snapshot.weights.len(),
                    "reallocation applied"
                );
            }
            Ok(None) => {}
            Err(error) => {
                metrics::counter!("allocation.failures").increment(1);
                warn!(
                    experiment_id = %experiment.id,
                    error = %error,
                    "reallocation failed, will retry next tick"
                );
            }
        }
    }
}
