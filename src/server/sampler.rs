//! Background workload sampler.
//!
//! Polls the workload status provider on its own interval and publishes the
//! result into a `watch` slot. The event loop reads the slot when answering
//! `info`; the slot is the only state the two tasks share.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::models::workload::WorkloadSnapshot;
use crate::providers::WorkloadStatusProvider;

/// Spawn the sampler task writing into `slot`.
///
/// Provider failures are recorded in the slot as `status = error` and never
/// stop the task.
#[must_use]
pub fn spawn_workload_sampler(
    provider: Arc<dyn WorkloadStatusProvider>,
    interval: Duration,
    slot: watch::Sender<WorkloadSnapshot>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("workload sampler shutting down");
                        break;
                    }
                    _ = ticker.tick() => {}
                }

                let sample = tokio::select! {
                    () = cancel.cancelled() => break,
                    sample = provider.query() => sample,
                };
                match sample {
                    Ok(status) => {
                        debug!(?status, "workload sampled");
                        slot.send_replace(WorkloadSnapshot::connected(status));
                    }
                    Err(err) => {
                        warn!(%err, "workload sample failed");
                        let failed = slot.borrow().failed(err.to_string());
                        slot.send_replace(failed);
                    }
                }
            }
        }
        .instrument(info_span!("workload_sampler")),
    )
}
