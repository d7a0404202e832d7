//! A self-ticking scheduler that runs until interrupted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use cronfile::{Cron, Daemon, Task};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> cronfile::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut cron = Cron::new(Utc);
    let counter = Arc::new(AtomicUsize::new(0));

    let seen = Arc::clone(&counter);
    cron.on_described(
        "* * * * *",
        "count minutes",
        Task::callback(move |done| {
            let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
            println!("{} minute(s) so far", n);
            done.ok();
        }),
    )?;
    cron.on(
        "*/2 * * * *",
        Task::callback(|done| done.err("every other minute fails")),
    )?;

    cron.events()
        .on_started(|wait| println!("first tick in {:?}", wait))
        .on_tick(|tick| println!("{}: {} job(s) due", tick.at, tick.due))
        .on_error(|err, at| eprintln!("{}: {}", at, err));

    let cron = Arc::new(cron);
    let daemon = Daemon::new(Arc::clone(&cron));
    daemon.start().await;

    tokio::signal::ctrl_c().await?;
    daemon.stop().await;
    cron.stop().await
}
