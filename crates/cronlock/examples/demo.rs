//! Minimal embedding: one replica, one job, firing every minute.
//!
//! Run a second copy against the same database file to watch the replicas
//! take turns winning the election.

use cronlock::{Scheduler, SqliteStore};

#[tokio::main]
async fn main() -> cronlock::Result<()> {
    tracing_subscriber::fmt().init();

    let store = SqliteStore::open("cronlock-demo.db")?;
    let cron = Scheduler::new(store);
    cron.start().await?;

    cron.register("example", "* * * * *", || async {
        tracing::info!("hello world!");
    })
    .await?;

    std::future::pending::<()>().await;
    Ok(())
}
