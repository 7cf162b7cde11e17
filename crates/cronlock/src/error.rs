use thiserror::Error;

/// Errors that can occur within the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failure reported by a non-SQLite store implementation.
    #[error("Store error: {0}")]
    Store(String),

    /// The cron expression could not be parsed as five-field standard cron.
    #[error("Bad cron expression: {0}")]
    BadCron(String),

    /// `register` was called before `start`, or the ticker loop is gone.
    #[error("Scheduler not started")]
    NotStarted,

    /// `start` was called on a scheduler that is already running.
    #[error("Scheduler already started")]
    AlreadyStarted,

    /// A registered job has no row in the store.
    #[error("Job not found: {name}")]
    JobMissing { name: String },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
