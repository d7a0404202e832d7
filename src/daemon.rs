//! Long-running mode: evaluate the schedule at every minute boundary.
//!
//! The daemon never goes through [`Cron::run`]. It asks the cron for the
//! jobs due each minute and runs them as a batch in the background, so a
//! slow batch never delays the next tick. Hooks and the lock marker are
//! not involved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone};
use tokio::select;
use tokio::sync::{mpsc, Mutex};
use tokio::time as tokio_time;
use tracing::{debug, info};

use crate::cron::Cron;
use crate::notify::Report;
use crate::schedule::truncate_to_minute;
use crate::tick::{self, BatchReport};
use crate::Result;

/// Ticks a [`Cron`] once a minute until stopped.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use chrono::Utc;
/// use cronfile::{Cron, Daemon, Task};
///
/// #[tokio::main]
/// async fn main() -> cronfile::Result<()> {
///     let mut cron = Cron::new(Utc);
///     cron.on("every_five_minutes", Task::callback(|done| done.ok()))?;
///     cron.events().on_error(|err, at| eprintln!("{}: {}", at, err));
///
///     let daemon = Daemon::new(Arc::new(cron));
///     daemon.start().await;
///
///     tokio::signal::ctrl_c().await?;
///     daemon.stop().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Daemon<Z>
where
    Z: TimeZone + Send + Sync + 'static,
    Z::Offset: Send + Sync,
{
    cron: Arc<Cron<Z>>,
    clock: Clock<Z>,
    running: Arc<AtomicBool>,
    stop_tx: Arc<Mutex<Option<mpsc::UnboundedSender<()>>>>,
}

type Clock<Z> = Arc<dyn Fn() -> DateTime<Z> + Send + Sync>;

impl<Z> Daemon<Z>
where
    Z: TimeZone + Send + Sync + 'static,
    Z::Offset: Send + Sync,
{
    pub fn new(cron: Arc<Cron<Z>>) -> Daemon<Z> {
        let wall = Arc::clone(&cron);
        Daemon::with_clock(cron, Arc::new(move || wall.wall_clock()))
    }

    fn with_clock(cron: Arc<Cron<Z>>, clock: Clock<Z>) -> Daemon<Z> {
        Daemon {
            cron,
            clock,
            running: Arc::new(AtomicBool::new(false)),
            stop_tx: Default::default(),
        }
    }

    pub fn cron(&self) -> &Arc<Cron<Z>> {
        &self.cron
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the daemon in background.
    /// A tokio task is spawned for the tick loop.
    pub async fn start(&self) {
        let stop_rx = self.install_stop_channel().await;
        let daemon = self.clone();
        tokio::spawn(async move {
            daemon.run_loop(stop_rx).await;
        });
    }

    /// Run the tick loop until [`Daemon::stop`] is called.
    pub async fn start_blocking(&self) {
        let stop_rx = self.install_stop_channel().await;
        self.run_loop(stop_rx).await;
    }

    /// Stop the daemon. Batches already spawned keep running.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(tx) = self.stop_tx.lock().await.as_ref() {
            let _ = tx.send(());
        }
    }

    /// Runs a single tick at a forced time and waits for its batch.
    ///
    /// Refused in production.
    pub async fn tick_at(&self, at: DateTime<Z>) -> Result<BatchReport> {
        self.cron.ensure_not_production("forcing a tick")?;
        Ok(run_tick(&self.cron, truncate_to_minute(at)).await)
    }

    async fn install_stop_channel(&self) -> mpsc::UnboundedReceiver<()> {
        let (stop_tx, stop_rx) = mpsc::unbounded_channel();
        *self.stop_tx.lock().await = Some(stop_tx);
        self.running.store(true, Ordering::SeqCst);
        stop_rx
    }

    async fn run_loop(&self, mut stop_rx: mpsc::UnboundedReceiver<()>) {
        let now = (self.clock)();
        let mut next = next_minute(&now);
        let wait = duration_until(&next, &now);
        info!(wait_ms = wait.as_millis() as u64, "daemon started");
        self.cron.events.emit_started(wait);

        loop {
            let wait = duration_until(&next, &(self.clock)());

            select! {
                // sleep until the next minute boundary
                _ = tokio_time::sleep(wait) => {
                    // a late wake-up ticks the current minute and skips the
                    // missed ones; an early one still ticks `next`
                    let now = (self.clock)();
                    let at = if now >= next {
                        truncate_to_minute(now)
                    } else {
                        next.clone()
                    };
                    next = at.clone() + chrono::Duration::minutes(1);

                    let cron = Arc::clone(&self.cron);
                    tokio::spawn(async move {
                        run_tick(&cron, at).await;
                    });
                },
                // wait daemon stopped signal
                _ = stop_rx.recv() => {
                    break;
                },
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("daemon stopped");
    }
}

/// One tick: due jobs (emitting `tick`), the batch, an `error` event per
/// failure, then the notifiers.
async fn run_tick<Z>(cron: &Cron<Z>, at: DateTime<Z>) -> BatchReport
where
    Z: TimeZone + Send + Sync + 'static,
    Z::Offset: Send + Sync,
{
    let due = cron.due_jobs(&at);
    if due.is_empty() {
        debug!(at = ?at, "nothing due");
        return BatchReport::default();
    }

    info!(at = ?at, due = due.len(), expressions = ?due.expressions, "tick");
    let report = tick::run_batch(&due.entries).await;
    for err in &report.errors {
        cron.events.emit_error(err, &at);
    }
    cron.notify(&Report::Results(report.summary()), &at).await;
    report
}

fn next_minute<Z>(now: &DateTime<Z>) -> DateTime<Z>
where
    Z: TimeZone,
{
    truncate_to_minute(now.clone()) + chrono::Duration::minutes(1)
}

fn duration_until<Z>(target: &DateTime<Z>, now: &DateTime<Z>) -> Duration
where
    Z: TimeZone,
{
    (target.clone() - now.clone())
        .to_std()
        .unwrap_or(Duration::ZERO)
}
