//! `cronlock`: durable distributed cron backed by a shared database.
//!
//! # Overview
//!
//! Any number of application replicas embed a [`Scheduler`] against the same
//! database and register named cron jobs. For every tick of a job's
//! expression, the replicas elect at most one executor through a
//! transactional predicate over a single `jobs` row; a heartbeat keeps the
//! winner's lease alive, and peers take over work whose lease has gone
//! stale. The database is the only coordination channel: no broker, no
//! leader election, no peer discovery.
//!
//! # Guarantees
//!
//! | Property        | Behaviour                                             |
//! |-----------------|-------------------------------------------------------|
//! | Election        | At most one replica runs a job per cron tick          |
//! | Crash recovery  | A dead executor's lease expires after 60 s            |
//! | Burned ticks    | A crashed execution's tick is consumed, never retried |
//! | Registration    | Idempotent across replicas; first insert wins         |
//! | Task failures   | Contained; the lease is always released               |
//!
//! # Example
//!
//! ```rust,no_run
//! use cronlock::{Scheduler, SqliteStore};
//!
//! #[tokio::main]
//! async fn main() -> cronlock::Result<()> {
//!     let store = SqliteStore::open("/var/lib/app/cron.db")?;
//!     let cron = Scheduler::new(store);
//!     cron.start().await?;
//!     cron.register("nightly-report", "0 3 * * *", || async {
//!         tracing::info!("generating report");
//!     })
//!     .await?;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod cron;
pub mod db;
pub mod engine;
pub mod error;
pub mod memory;
mod runner;
pub mod store;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use cron::{CronParser, StandardCron};
pub use db::SqliteStore;
pub use engine::Scheduler;
pub use error::{Result, SchedulerError};
pub use memory::MemoryScheduler;
pub use store::{Store, StoreTx};
pub use types::{JobRow, Task};
