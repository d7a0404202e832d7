//! # Cronfile
//!
//! Declare a process's scheduled jobs in code and run whatever is due.
//!
//! ## Usage
//!
//! Add cronfile crate to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! cronfile = "0.1"
//! ```
//!
//! Jobs are registered under five-field schedule expressions, aliases
//! (`@weekly`, `every_five_minutes`, ...) or the `start`/`stop` hooks:
//!
//! ```text
//! min   hour   day of month   month   day of week
//! *     *      *              *       *
//! ```
//!
//! The binary is meant to be invoked once a minute by the system scheduler.
//! Each invocation runs the start hooks, every job due this minute
//! concurrently, then the stop hooks, holding a lock marker throughout.
//!
//! ```rust,ignore
//! use chrono::Utc;
//! use cronfile::{Cron, Task};
//!
//! #[tokio::main]
//! async fn main() -> cronfile::Result<()> {
//!     let mut cron = Cron::new(Utc);
//!
//!     cron.on("start", Task::callback(|done| {
//!         println!("connecting");
//!         done.ok();
//!     }))?;
//!
//!     cron.on_described("every_five_minutes", "refresh cache", Task::future(|| async {
//!         refresh().await
//!     }))?;
//!
//!     cron.on("stop", Task::blocking(|| {
//!         println!("disconnecting");
//!         Ok::<(), std::io::Error>(())
//!     }))?;
//!
//!     // `my-cron list`, `my-cron test`, `my-cron 12:50`, `--no-locking`
//!     cron.run_and_exit().await;
//!     Ok(())
//! }
//! ```
//!
//! For a long-lived process that ticks on its own, see [`Daemon`].

mod alias;
mod args;
mod config;
mod cron;
mod daemon;
mod entry;
mod error;
mod events;
mod lock;
mod notify;
mod registry;
mod schedule;
mod task;
mod tick;

pub use crate::{
    alias::{AliasNames, AliasTable},
    args::{RunArgs, RunMode},
    config::CronConfig,
    cron::{Cron, RunOutcome, RunReport, RunState},
    daemon::Daemon,
    entry::Entry,
    error::{BoxError, CronError},
    events::{Events, TickEvent},
    lock::{FileLock, LockManager, NoLock},
    notify::{Notifier, Report, Summary},
    registry::{Hook, JobRegistry, ScheduledJobs},
    schedule::{truncate_to_minute, ScheduleExpression},
    task::{Done, JobResult, Task},
    tick::{due_always, due_at, run_batch, run_series, BatchReport, Due},
};

pub type Result<T> = std::result::Result<T, CronError>;
