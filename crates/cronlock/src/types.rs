use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::error::Result;

/// A stored job callable. Each invocation produces a fresh future that runs
/// one execution of the job.
pub type Task = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// A registration request travelling from `register` to the ticker loop.
pub(crate) struct Routine {
    /// Cluster-unique job identifier.
    pub name: String,
    /// Five-field cron expression.
    pub expr: String,
    /// The job callable.
    pub task: Task,
    /// Written exactly once with the persistence result.
    pub ack: oneshot::Sender<Result<()>>,
}

/// A job as held in the local registry after a successful registration.
#[derive(Clone)]
pub(crate) struct RegisteredJob {
    pub expr: String,
    pub task: Task,
}

/// One row of the shared `jobs` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobRow {
    /// True iff some replica currently holds the execution lease.
    pub active: bool,
    /// Scheduled tick of the most recently elected execution (UTC).
    pub last_run: DateTime<Utc>,
    /// Wall-clock timestamp of the most recent heartbeat (UTC).
    pub last_beat: DateTime<Utc>,
}
