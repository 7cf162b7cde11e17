use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::cron::{CronParser, StandardCron};
use crate::error::{Result, SchedulerError};
use crate::runner;
use crate::store::{Store, StoreTx};
use crate::types::{RegisteredJob, Routine, Task};

/// Durable cron scheduler. Every replica holding a scheduler against the
/// same backing store cooperates on one `jobs` table; for each tick of a
/// registered expression, at most one replica runs the job.
///
/// A scheduler is inert until [`start`](Scheduler::start) creates the schema
/// and spawns the ticker loop. [`register`](Scheduler::register) then
/// persists jobs and adds them to the local registry.
pub struct Scheduler<S: Store> {
    shared: Arc<Shared<S>>,
    /// Registration funnel into the ticker loop. Present once started; held
    /// by the handles rather than by `Shared` so the loop winds down when
    /// the last handle is dropped.
    reg_tx: Arc<Mutex<Option<mpsc::Sender<Routine>>>>,
}

impl<S: Store> Clone for Scheduler<S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            reg_tx: self.reg_tx.clone(),
        }
    }
}

pub(crate) struct Shared<S> {
    pub(crate) store: S,
    pub(crate) config: Config,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) cron: Arc<dyn CronParser>,
    /// Local registry. Written only by the ticker loop; read for tick
    /// snapshots and by tests.
    registry: Mutex<HashMap<String, RegisteredJob>>,
    started: AtomicBool,
    /// Completion observer; each finished execution sends its job name.
    pub(crate) completions: Mutex<Option<mpsc::Sender<String>>>,
}

impl<S: Store> Scheduler<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, Config::default())
    }

    pub fn with_config(store: S, config: Config) -> Self {
        Self::assemble(store, config, Arc::new(SystemClock), Arc::new(StandardCron))
    }

    fn assemble(
        store: S,
        config: Config,
        clock: Arc<dyn Clock>,
        cron: Arc<dyn CronParser>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                config,
                clock,
                cron,
                registry: Mutex::new(HashMap::new()),
                started: AtomicBool::new(false),
                completions: Mutex::new(None),
            }),
            reg_tx: Arc::new(Mutex::new(None)),
        }
    }

    /// Initialise the shared schema and spawn the ticker loop.
    ///
    /// Schema creation is attempted up to three times with exponential
    /// backoff (1 s, 2 s, 4 s); the last error is returned if all attempts
    /// fail, and the scheduler may be started again afterwards.
    pub async fn start(&self) -> Result<()> {
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyStarted);
        }

        let mut last_err = None;
        for attempt in 0..self.shared.config.create_table_attempts {
            match self.shared.store.create_table() {
                Ok(()) => {
                    last_err = None;
                    break;
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "schema creation failed");
                    self.shared
                        .clock
                        .sleep(Duration::from_secs(1 << attempt))
                        .await;
                    last_err = Some(e);
                }
            }
        }
        if let Some(e) = last_err {
            self.shared.started.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let (tx, rx) = mpsc::channel(16);
        *self.reg_tx.lock().unwrap() = Some(tx);
        tokio::spawn(run_loop(self.shared.clone(), rx));
        info!("scheduler started");
        Ok(())
    }

    /// Register a job under a cluster-unique name.
    ///
    /// The expression is validated before anything touches the store. The
    /// call resolves once the ticker loop has persisted the job row; a row
    /// that already exists (another replica registered first) is left as is.
    pub async fn register<F, Fut>(&self, name: &str, expr: &str, task: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if !self.shared.cron.is_valid(expr) {
            return Err(SchedulerError::BadCron(expr.to_string()));
        }
        let tx = self
            .reg_tx
            .lock()
            .unwrap()
            .clone()
            .ok_or(SchedulerError::NotStarted)?;

        let task: Task =
            Arc::new(move || Box::pin(task()) as Pin<Box<dyn Future<Output = ()> + Send>>);
        let (ack_tx, ack_rx) = oneshot::channel();
        let routine = Routine {
            name: name.to_string(),
            expr: expr.to_string(),
            task,
            ack: ack_tx,
        };
        tx.send(routine)
            .await
            .map_err(|_| SchedulerError::NotStarted)?;
        ack_rx.await.map_err(|_| SchedulerError::NotStarted)?
    }

    /// Install a completion observer. After every completion write the
    /// finished job's name is offered to `tx` without blocking; tests use
    /// this to synchronize on executions instead of polling the store.
    pub fn on_complete(&self, tx: mpsc::Sender<String>) {
        *self.shared.completions.lock().unwrap() = Some(tx);
    }

    #[cfg(test)]
    fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .shared
            .registry
            .lock()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

/// The ticker loop: single owner of the registry, multiplexing registration
/// requests and tick events until every scheduler handle is gone.
async fn run_loop<S: Store>(shared: Arc<Shared<S>>, mut reg_rx: mpsc::Receiver<Routine>) {
    let period = shared.config.tick_interval;
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        tokio::select! {
            routine = reg_rx.recv() => match routine {
                Some(routine) => shared.handle_registration(routine),
                None => {
                    debug!("scheduler dropped; ticker loop exiting");
                    break;
                }
            },
            _ = ticker.tick() => shared.tick_all(),
        }
    }
}

impl<S: Store> Shared<S> {
    /// Store the routine locally, then persist its row and ack the caller.
    fn handle_registration(&self, routine: Routine) {
        let Routine {
            name,
            expr,
            task,
            ack,
        } = routine;
        self.registry.lock().unwrap().insert(
            name.clone(),
            RegisteredJob {
                expr: expr.clone(),
                task,
            },
        );
        let result = self.persist_job(&name, &expr);
        if let Err(ref e) = result {
            warn!(job = %name, error = %e, "job registration failed");
        } else {
            info!(job = %name, %expr, "job registered");
        }
        let _ = ack.send(result);
    }

    /// Insert the job row if absent. The initial `last_run` is the previous
    /// tick at registration time, so an expression's most recent elapsed
    /// tick does not fire retroactively.
    fn persist_job(&self, name: &str, expr: &str) -> Result<()> {
        let initial_last_run = self.cron.prev_tick(expr, false)?;
        self.store.insert_job(name, initial_last_run)
    }

    /// Evaluate every registered job against the current wall clock. Called
    /// once per tick event; failures are logged per job and never stop the
    /// sweep.
    pub(crate) fn tick_all(self: &Arc<Self>) {
        let now = self.clock.now();
        let jobs: Vec<(String, RegisteredJob)> = self
            .registry
            .lock()
            .unwrap()
            .iter()
            .map(|(name, job)| (name.clone(), job.clone()))
            .collect();
        for (name, job) in jobs {
            if let Err(e) = self.evaluate(now, &name, &job) {
                error!(job = %name, error = %e, "tick evaluation failed");
            }
        }
    }

    /// The election predicate. Decides, inside one store transaction,
    /// whether this replica runs `name` for the tick preceding `now`, and
    /// if so takes the lease and spawns the runner.
    fn evaluate(self: &Arc<Self>, now: DateTime<Utc>, name: &str, job: &RegisteredJob) -> Result<()> {
        let tick = self.cron.prev_tick_before(&job.expr, now, true)?;

        let mut tx = self.store.begin()?;
        let Some(row) = tx.select_job(name)? else {
            // Registration always inserts the row first, so a missing row
            // means the table was tampered with. Roll back and surface it.
            return Err(SchedulerError::JobMissing {
                name: name.to_string(),
            });
        };
        if tick <= row.last_run {
            // This tick was already elected, here or elsewhere.
            tx.commit()?;
            return Ok(());
        }
        if row.active && row.last_beat > now - self.config.lease_window {
            // Another replica is running this job and its lease is fresh.
            tx.commit()?;
            return Ok(());
        }
        tx.activate_job(name, tick)?;
        tx.commit()?;

        debug!(job = %name, %tick, "job elected");
        runner::spawn(self.clone(), name.to_string(), job.task.clone(), tick);
        Ok(())
    }
}
