use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::cron::{CronParser, StandardCron};
use crate::error::{Result, SchedulerError};
use crate::types::{RegisteredJob, Routine, Task};

/// How often the in-memory ticker re-checks every expression. Matches the
/// one-minute cron resolution exactly, so each tick fires at most once.
const MEMORY_TICK: Duration = Duration::from_secs(60);

/// Non-durable scheduler for examples and tests.
///
/// Same registration surface as the durable scheduler, no store: jobs fire
/// on this process's ticker whenever their expression matches the current
/// minute. Nothing survives a restart and there is no cross-replica
/// election, so every replica running the same job fires it independently.
pub struct MemoryScheduler {
    inner: Arc<MemoryInner>,
    reg_tx: mpsc::Sender<Routine>,
}

struct MemoryInner {
    cron: Arc<dyn CronParser>,
    registry: Mutex<HashMap<String, RegisteredJob>>,
}

impl MemoryScheduler {
    /// Create the scheduler and spawn its ticker loop. Must be called from
    /// within a tokio runtime.
    pub fn new() -> Self {
        Self::assemble(Arc::new(StandardCron))
    }

    fn assemble(cron: Arc<dyn CronParser>) -> Self {
        let (reg_tx, mut reg_rx) = mpsc::channel::<Routine>(16);
        let inner = Arc::new(MemoryInner {
            cron,
            registry: Mutex::new(HashMap::new()),
        });

        let loop_inner = inner.clone();
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + MEMORY_TICK, MEMORY_TICK);
            loop {
                tokio::select! {
                    routine = reg_rx.recv() => match routine {
                        Some(routine) => {
                            let Routine { name, expr, task, ack } = routine;
                            loop_inner
                                .registry
                                .lock()
                                .unwrap()
                                .insert(name, RegisteredJob { expr, task });
                            let _ = ack.send(Ok(()));
                        }
                        None => {
                            debug!("memory scheduler dropped; ticker loop exiting");
                            break;
                        }
                    },
                    _ = ticker.tick() => loop_inner.tick_all(Utc::now()),
                }
            }
        });

        Self { inner, reg_tx }
    }

    /// Register a job. Fails only on an invalid expression; there is
    /// nothing to persist.
    pub async fn register<F, Fut>(&self, name: &str, expr: &str, task: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if !self.inner.cron.is_valid(expr) {
            return Err(SchedulerError::BadCron(expr.to_string()));
        }
        let task: Task =
            Arc::new(move || Box::pin(task()) as Pin<Box<dyn Future<Output = ()> + Send>>);
        let (ack_tx, ack_rx) = oneshot::channel();
        let routine = Routine {
            name: name.to_string(),
            expr: expr.to_string(),
            task,
            ack: ack_tx,
        };
        self.reg_tx
            .send(routine)
            .await
            .map_err(|_| SchedulerError::NotStarted)?;
        ack_rx.await.map_err(|_| SchedulerError::NotStarted)?
    }
}

impl Default for MemoryScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryInner {
    /// Fire every job whose expression matches the minute containing `now`.
    fn tick_all(&self, now: DateTime<Utc>) {
        let jobs: Vec<(String, RegisteredJob)> = self
            .registry
            .lock()
            .unwrap()
            .iter()
            .map(|(name, job)| (name.clone(), job.clone()))
            .collect();
        for (name, job) in jobs {
            match self.cron.prev_tick_before(&job.expr, now, true) {
                Ok(tick) if now.signed_duration_since(tick) < chrono::Duration::minutes(1) => {
                    debug!(job = %name, %tick, "firing in-memory job");
                    tokio::spawn((job.task)());
                }
                Ok(_) => {}
                Err(e) => warn!(job = %name, error = %e, "expression evaluation failed"),
            }
        }
    }
}
