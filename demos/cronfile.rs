//! A cronfile meant to be invoked once a minute by the system scheduler.
//!
//! ```text
//! cargo run --example cronfile -- list
//! cargo run --example cronfile -- test --no-locking
//! cargo run --example cronfile -- 12:50
//! ```

use std::time::Duration;

use chrono::Local;
use cronfile::{Cron, CronConfig, Task};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> cronfile::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut cron = Cron::with_config(Local, CronConfig::from_env())?;
    cron.aliases([("0 3 * * *", vec!["nightly", "@backup"])])?;

    cron.on(
        "start",
        Task::callback(|done| {
            println!("opening connections");
            done.ok();
        }),
    )?;

    cron.on_described(
        "every_five_minutes",
        "refresh the cache",
        Task::future(|| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            println!("cache refreshed at {}", Local::now());
            Ok::<(), std::io::Error>(())
        }),
    )?;

    cron.on_described(
        "nightly",
        "compress yesterday's logs",
        Task::blocking(|| {
            println!("compressing logs");
            Ok::<(), std::io::Error>(())
        }),
    )?;

    cron.on(
        "stop",
        Task::callback(|done| {
            println!("closing connections");
            done.ok();
        }),
    )?;

    cron.run_and_exit().await;
    Ok(())
}
