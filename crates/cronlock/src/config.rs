use std::time::Duration;

/// Ticker cadence: how often every registered job is re-evaluated. Much finer
/// than the one-minute cron resolution so a due tick is detected promptly.
pub const TICK_INTERVAL_SECS: u64 = 15;
/// Heartbeat cadence while an execution lease is held.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 15;
/// A lease is stale once its last heartbeat is older than this. Must exceed
/// the heartbeat cadence by at least 3x.
pub const LEASE_WINDOW_SECS: i64 = 60;
/// Schema creation attempts during start, with exponential backoff between.
pub const CREATE_TABLE_ATTEMPTS: u32 = 3;

/// Scheduler tuning knobs. The defaults give three consecutive missed
/// heartbeats before a peer may take over a lease.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interval between ticker loop wakeups.
    pub tick_interval: Duration,
    /// Interval between heartbeat writes while a job runs.
    pub heartbeat_interval: Duration,
    /// Age beyond which a heartbeat no longer defends a lease.
    pub lease_window: chrono::Duration,
    /// How many times `start` tries to create the schema before giving up.
    pub create_table_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(TICK_INTERVAL_SECS),
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
            lease_window: chrono::Duration::seconds(LEASE_WINDOW_SECS),
            create_table_attempts: CREATE_TABLE_ATTEMPTS,
        }
    }
}
