use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::engine::Shared;
use crate::store::Store;
use crate::types::Task;

/// Run one elected execution: the user task in its own spawned task, and a
/// heartbeat task defending the lease until the completion write.
///
/// The two tasks end together. The executor signals the oneshot channel when
/// the user future settles, panicked or not; the heartbeat task then stops
/// beating, releases the lease, and notifies any completion observer.
pub(crate) fn spawn<S: Store>(
    shared: Arc<Shared<S>>,
    name: String,
    task: Task,
    elected_tick: DateTime<Utc>,
) {
    let (done_tx, mut done_rx) = oneshot::channel::<()>();

    let job_name = name.clone();
    tokio::spawn(async move {
        // The user future runs in a child task so a panic is contained
        // there; the completion signal must fire either way.
        let outcome = tokio::spawn(task()).await;
        if let Err(e) = outcome {
            warn!(job = %job_name, error = %e, "job task aborted");
        }
        let _ = done_tx.send(());
    });

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut done_rx => break,
                _ = shared.clock.sleep(shared.config.heartbeat_interval) => {
                    if let Err(e) = shared.store.heartbeat(&name, shared.clock.now()) {
                        // A missed beat is tolerable; the lease survives up
                        // to three of them.
                        warn!(job = %name, error = %e, "heartbeat write failed");
                    }
                }
            }
        }
        if let Err(e) = shared
            .store
            .deactivate_job(&name, elected_tick, shared.clock.now())
        {
            // The row stays active until a peer's takeover after the lease
            // window; the tick itself was already consumed at election.
            warn!(job = %name, error = %e, "completion write failed");
        } else {
            debug!(job = %name, tick = %elected_tick, "job completed");
        }
        let observer = shared.completions.lock().unwrap().clone();
        if let Some(tx) = observer {
            let _ = tx.try_send(name);
        }
    });
}
