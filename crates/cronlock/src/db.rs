use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::store::{Store, StoreTx};
use crate::types::JobRow;

const CREATE_JOBS_TABLE: &str = "CREATE TABLE IF NOT EXISTS jobs (
    name      TEXT PRIMARY KEY,
    active    BOOLEAN NOT NULL DEFAULT FALSE,
    last_run  TIMESTAMP NOT NULL,
    last_beat TIMESTAMP NOT NULL
)";

const INSERT_JOB: &str =
    "INSERT OR IGNORE INTO jobs (name, active, last_run, last_beat) VALUES (?1, FALSE, ?2, ?3)";

const SELECT_JOB: &str = "SELECT active, last_run, last_beat FROM jobs WHERE name = ?1";

const ACTIVATE_JOB: &str = "UPDATE jobs SET active = TRUE, last_run = ?2 WHERE name = ?1";

const HEARTBEAT_JOB: &str = "UPDATE jobs SET last_beat = ?2 WHERE name = ?1";

const DEACTIVATE_JOB: &str =
    "UPDATE jobs SET active = FALSE, last_run = ?2, last_beat = ?3 WHERE name = ?1";

/// SQLite-backed job store.
///
/// Replicas coordinate by opening the same database file. WAL mode keeps
/// readers and the single writer out of each other's way, and `busy_timeout`
/// makes competing election transactions queue instead of erroring.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the shared database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database. Single-replica only; useful for
    /// tests and local experiments.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl Store for SqliteStore {
    type Tx<'a>
        = SqliteTx<'a>
    where
        Self: 'a;

    fn create_table(&self) -> Result<()> {
        self.conn.lock().unwrap().execute(CREATE_JOBS_TABLE, [])?;
        Ok(())
    }

    fn insert_job(&self, name: &str, initial_last_run: DateTime<Utc>) -> Result<()> {
        self.conn.lock().unwrap().execute(
            INSERT_JOB,
            params![name, initial_last_run, DateTime::<Utc>::UNIX_EPOCH],
        )?;
        Ok(())
    }

    fn heartbeat(&self, name: &str, at: DateTime<Utc>) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute(HEARTBEAT_JOB, params![name, at])?;
        Ok(())
    }

    fn deactivate_job(
        &self,
        name: &str,
        elected_tick: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute(DEACTIVATE_JOB, params![name, elected_tick, at])?;
        Ok(())
    }

    fn begin(&self) -> Result<SqliteTx<'_>> {
        let conn = self.conn.lock().unwrap();
        // IMMEDIATE takes the write lock up front, so the whole
        // select-then-update sequence is serialized against other replicas.
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(SqliteTx { conn, open: true })
    }
}

/// An open election transaction. Rolls back on drop unless committed.
pub struct SqliteTx<'a> {
    conn: MutexGuard<'a, Connection>,
    open: bool,
}

impl StoreTx for SqliteTx<'_> {
    fn select_job(&mut self, name: &str) -> Result<Option<JobRow>> {
        let row = self
            .conn
            .query_row(SELECT_JOB, params![name], |row| {
                Ok(JobRow {
                    active: row.get(0)?,
                    last_run: row.get(1)?,
                    last_beat: row.get(2)?,
                })
            })
            .optional()?;
        Ok(row)
    }

    fn activate_job(&mut self, name: &str, tick: DateTime<Utc>) -> Result<()> {
        self.conn.execute(ACTIVATE_JOB, params![name, tick])?;
        Ok(())
    }

    fn commit(mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        self.open = false;
        Ok(())
    }
}

impl Drop for SqliteTx<'_> {
    fn drop(&mut self) {
        if self.open {
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}
