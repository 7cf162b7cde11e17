use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::JobRow;

/// Backing store for the shared `jobs` table, one method per statement.
///
/// The scheduler drives every replica-coordination write through this trait;
/// an implementation only has to translate each operation into its dialect
/// and honor the transaction contract of [`Store::begin`].
pub trait Store: Send + Sync + 'static {
    type Tx<'a>: StoreTx
    where
        Self: 'a;

    /// Idempotent DDL creating the `jobs` table.
    fn create_table(&self) -> Result<()>;

    /// Insert a job row with `active = false` and `last_beat` at the epoch.
    /// A row that already exists is left untouched.
    fn insert_job(&self, name: &str, initial_last_run: DateTime<Utc>) -> Result<()>;

    /// Refresh `last_beat`. Deliberately outside any transaction; the
    /// election fields are not touched so no serialization is needed.
    fn heartbeat(&self, name: &str, at: DateTime<Utc>) -> Result<()>;

    /// Completion write: release the lease and restate the elected tick.
    fn deactivate_job(
        &self,
        name: &str,
        elected_tick: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Open the election transaction. The returned transaction must hold
    /// exclusive write access to the row until commit or drop, so that
    /// concurrent evaluators on other replicas serialize their
    /// read-modify-write sequences.
    fn begin(&self) -> Result<Self::Tx<'_>>;
}

/// The election transaction: a select and an optional activation, then
/// commit. Dropping the transaction without committing rolls it back.
pub trait StoreTx {
    fn select_job(&mut self, name: &str) -> Result<Option<JobRow>>;

    /// Take the lease: `active = true`, `last_run = tick`. The tick value is
    /// the scheduled moment the execution belongs to, not the wall clock.
    fn activate_job(&mut self, name: &str, tick: DateTime<Utc>) -> Result<()>;

    fn commit(self) -> Result<()>;
}
